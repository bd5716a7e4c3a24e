//! Dual JSON/XML persistence, grounded on the serde usage in
//! `core/data/container.rs` plus an XML-handling idiom borrowed from
//! elsewhere in the pack, since the base dependency stack carries no XML
//! support of its own.

use crate::error::{EngineError, EngineResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Uniform JSON+XML round-trip contract for anything the engine persists:
/// `Roi`, `Fitter`, and fit-history snapshots.
pub trait Persist: Sized + Serialize + DeserializeOwned {
    fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(EngineError::from)
    }

    fn from_json(text: &str) -> EngineResult<Self> {
        serde_json::from_str(text).map_err(EngineError::from)
    }

    fn to_xml(&self) -> EngineResult<String> {
        quick_xml::se::to_string(self).map_err(|e| EngineError::Xml(e.to_string()))
    }

    fn from_xml(text: &str) -> EngineResult<Self> {
        quick_xml::de::from_str(text).map_err(|e| EngineError::Xml(e.to_string()))
    }
}

impl Persist for crate::engine::roi::Roi {}
impl Persist for crate::engine::fitter::Fitter {}
impl Persist for crate::engine::fit_settings::FitSettings {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fit_settings::FitSettings;

    #[test]
    fn json_round_trip_preserves_settings() {
        let settings = FitSettings::default();
        let json = settings.to_json().unwrap();
        let back = FitSettings::from_json(&json).unwrap();
        assert_eq!(back.kon_width, settings.kon_width);
    }

    #[test]
    fn xml_round_trip_preserves_settings() {
        let settings = FitSettings::default();
        let xml = settings.to_xml().unwrap();
        let back = FitSettings::from_xml(&xml).unwrap();
        assert_eq!(back.fitter_max_iter, settings.fitter_max_iter);
    }
}
