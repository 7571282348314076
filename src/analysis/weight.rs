use super::WeightClass;

/// Weight bucket for a box `height_px` tall.
///
/// Calibrated for the line camera at its mounting distance; boundaries are exclusive
/// upper bounds.
pub fn estimate_weight(height_px: i32) -> WeightClass {
    if height_px < 300 {
        WeightClass::Class50g
    } else if height_px < 950 {
        WeightClass::Class70g
    } else if height_px < 1300 {
        WeightClass::Class100g
    } else {
        WeightClass::Class250g
    }
}
