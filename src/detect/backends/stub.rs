use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::detect::backend::{InferenceSession, InputTensor};
use crate::error::InspectError;

/// Scripted session for tests and demos.
///
/// Returns queued outputs in order, then repeats the fallback output. Counts calls so
/// callers can assert a stage was or was not invoked.
pub struct ScriptedSession {
    input_shape: [usize; 4],
    output_shape: Option<Vec<usize>>,
    queued: VecDeque<Result<Vec<f32>, String>>,
    fallback: Result<Vec<f32>, String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new(input_shape: [usize; 4]) -> Self {
        Self {
            input_shape,
            output_shape: None,
            queued: VecDeque::new(),
            fallback: Ok(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Output returned once the queue is exhausted.
    pub fn with_output(mut self, output: Vec<f32>) -> Self {
        self.fallback = Ok(output);
        self
    }

    /// Queue a one-shot output.
    pub fn then_output(mut self, output: Vec<f32>) -> Self {
        self.queued.push_back(Ok(output));
        self
    }

    /// Queue a one-shot failure.
    pub fn then_fail(mut self, reason: &str) -> Self {
        self.queued.push_back(Err(reason.to_string()));
        self
    }

    /// Fail every call once the queue is exhausted.
    pub fn failing(mut self, reason: &str) -> Self {
        self.fallback = Err(reason.to_string());
        self
    }

    pub fn with_output_shape(mut self, shape: Vec<usize>) -> Self {
        self.output_shape = Some(shape);
        self
    }

    /// Shared call counter.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl InferenceSession for ScriptedSession {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn output_shape(&self) -> Option<Vec<usize>> {
        self.output_shape.clone()
    }

    fn run(&mut self, input: InputTensor) -> Result<Vec<f32>, InspectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if input.shape() != self.input_shape {
            return Err(InspectError::inference(format!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }
        let next = self
            .queued
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(InspectError::Inference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_then_fallback() {
        let mut session = ScriptedSession::new([1, 3, 2, 2])
            .then_fail("boom")
            .with_output(vec![1.0]);
        let calls = session.calls();
        let input = InputTensor::zeros([1, 3, 2, 2]);

        assert!(session.run(input.clone()).is_err());
        assert_eq!(session.run(input.clone()).unwrap(), vec![1.0]);
        assert_eq!(session.run(input).unwrap(), vec![1.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn wrong_shape_is_an_inference_error() {
        let mut session = ScriptedSession::new([1, 3, 4, 4]);
        let err = session.run(InputTensor::zeros([1, 3, 2, 2])).unwrap_err();
        assert!(matches!(err, InspectError::Inference(_)));
    }
}
