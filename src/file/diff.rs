//! Diffing a local parameter file against flight-controller values

use std::collections::{BTreeSet, HashMap};

use crate::param::{ParamValue, Tolerance};

use super::ParameterFile;

/// Names whose pending value differs from what the flight controller
/// reports, beyond tolerance, or which the flight controller does not have.
///
/// Only parameters with a pending change are considered; entries without a
/// `new_value` never flag. The result is the set a caller passes to
/// [`ParameterFile::flag_for_upload`] before invoking the sync engine.
pub fn diff(
    local: &ParameterFile,
    remote: &HashMap<String, ParamValue>,
    tol: &Tolerance,
) -> BTreeSet<String> {
    let mut flagged = BTreeSet::new();
    for entry in local.entries() {
        let param = &entry.param;
        let Some(target) = param.new_value.as_ref() else {
            continue;
        };
        match remote.get(&param.name) {
            Some(current) if tol.matches(target, current) => {}
            // Differs beyond tolerance, or new to the FC
            _ => {
                flagged.insert(param.name.clone());
            }
        }
    }
    flagged
}
