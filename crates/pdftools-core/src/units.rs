//! Length unit conversion
//!
//! Every unit maps to its length in millimeters; converting between two
//! units goes through that common base.

use serde::{Deserialize, Serialize};

/// Length units accepted for output sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementUnit {
    #[serde(rename = "mm")]
    Millimeter,
    #[serde(rename = "cm")]
    Centimeter,
    #[serde(rename = "in")]
    Inch,
    /// 1/72 inch
    #[serde(rename = "pdf")]
    PdfPoint,
}

impl MeasurementUnit {
    pub const ALL: [MeasurementUnit; 4] = [
        MeasurementUnit::Millimeter,
        MeasurementUnit::Centimeter,
        MeasurementUnit::Inch,
        MeasurementUnit::PdfPoint,
    ];

    /// Length of one unit in millimeters
    pub fn factor(self) -> f64 {
        match self {
            MeasurementUnit::Millimeter => 1.0,
            MeasurementUnit::Centimeter => 10.0,
            MeasurementUnit::Inch => 25.4,
            MeasurementUnit::PdfPoint => 0.3527777777777,
        }
    }

    /// Parse the wire name ("mm", "cm", "in", "pdf")
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mm" => Some(MeasurementUnit::Millimeter),
            "cm" => Some(MeasurementUnit::Centimeter),
            "in" => Some(MeasurementUnit::Inch),
            "pdf" => Some(MeasurementUnit::PdfPoint),
            _ => None,
        }
    }
}

/// Convert `value` expressed in `from` units into `to` units
pub fn convert(value: f64, from: MeasurementUnit, to: MeasurementUnit) -> f64 {
    if from == to {
        return value;
    }
    value * from.factor() / to.factor()
}

/// Convert a length into PDF points
pub fn to_points(value: f64, unit: MeasurementUnit) -> f64 {
    convert(value, unit, MeasurementUnit::PdfPoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_unit() -> impl Strategy<Value = MeasurementUnit> {
        prop_oneof![
            Just(MeasurementUnit::Millimeter),
            Just(MeasurementUnit::Centimeter),
            Just(MeasurementUnit::Inch),
            Just(MeasurementUnit::PdfPoint),
        ]
    }

    #[test]
    fn test_inch_to_points() {
        let points = to_points(1.0, MeasurementUnit::Inch);
        assert!((points - 72.0).abs() < 1e-6);
    }

    #[test]
    fn test_a4_width_in_points() {
        let points = to_points(210.0, MeasurementUnit::Millimeter);
        assert!((points - 595.2756).abs() < 1e-3);
    }

    #[test]
    fn test_cm_to_mm() {
        assert_eq!(
            convert(2.5, MeasurementUnit::Centimeter, MeasurementUnit::Millimeter),
            25.0
        );
    }

    #[test]
    fn test_unit_wire_names() {
        let json = serde_json::to_string(&MeasurementUnit::PdfPoint).unwrap();
        assert_eq!(json, "\"pdf\"");
        let unit: MeasurementUnit = serde_json::from_str("\"in\"").unwrap();
        assert_eq!(unit, MeasurementUnit::Inch);
        assert_eq!(MeasurementUnit::from_name("cm"), Some(MeasurementUnit::Centimeter));
        assert_eq!(MeasurementUnit::from_name("ft"), None);
    }

    proptest! {
        #[test]
        fn identity_conversion(value in -1.0e6f64..1.0e6, unit in any_unit()) {
            prop_assert_eq!(convert(value, unit, unit), value);
        }

        #[test]
        fn round_trip_conversion(value in -1.0e6f64..1.0e6, a in any_unit(), b in any_unit()) {
            let back = convert(convert(value, a, b), b, a);
            prop_assert!((back - value).abs() <= 1e-9 * value.abs().max(1.0));
        }

        #[test]
        fn conversion_matches_factor_ratio(value in 0.0f64..1.0e4, a in any_unit(), b in any_unit()) {
            let expected = value * (a.factor() / b.factor());
            let actual = convert(value, a, b);
            prop_assert!((actual - expected).abs() <= 1e-9 * expected.abs().max(1.0));
        }
    }
}
