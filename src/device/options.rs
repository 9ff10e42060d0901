//! Option engine (C7): descriptor cache, typed `GET_VALUE`/`SET_VALUE`/
//! `SET_AUTO` accessors and their preconditions.

use std::collections::HashMap;

use tracing::warn;

use crate::enums::{Capabilities, Unit, ValueKind, WriteInfo};
use crate::error::Error;
use crate::session::WithSession;
use crate::wire::codec::WireConstraint;
use crate::wire::Fixed;

/// A fully decoded option descriptor, attached to its owning group (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    pub index: i32,
    pub name: String,
    pub title: String,
    pub description: String,
    pub value_kind: ValueKind,
    pub unit: Unit,
    pub size: i32,
    pub capabilities: Capabilities,
    pub constraint: OptionConstraint,
    pub group: Option<String>,
}

impl OptionDescriptor {
    /// Number of word-sized (or string) elements this option carries.
    pub fn element_count(&self) -> i32 {
        match self.value_kind {
            ValueKind::Int | ValueKind::Fixed => self.size / 4,
            ValueKind::Bool | ValueKind::String => 1,
            ValueKind::Button | ValueKind::Group | ValueKind::Unknown(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionConstraint {
    None,
    RangeInt { min: i32, max: i32, quant: i32 },
    RangeFixed { min: Fixed, max: Fixed, quant: Fixed },
    WordList(Vec<i32>),
    FixedList(Vec<Fixed>),
    StringList(Vec<String>),
}

/// An option group as encountered while walking the descriptor list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionGroup {
    pub title: String,
    pub option_names: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct OptionCache {
    descriptors: Vec<OptionDescriptor>,
    by_name: HashMap<String, usize>,
    groups: Vec<OptionGroup>,
    loaded: bool,
}

impl OptionCache {
    pub fn invalidate(&mut self) {
        self.loaded = false;
        self.descriptors.clear();
        self.by_name.clear();
        self.groups.clear();
    }

    pub fn ensure_loaded<S: WithSession>(&mut self, session: &S, handle: i32) -> Result<(), Error> {
        if self.loaded {
            return Ok(());
        }
        let wire = session.with_session(|s| s.get_option_descriptors(handle))?;

        let mut current_group: Option<String> = None;
        for (position, descriptor) in wire.into_iter().enumerate() {
            let index = (position + 1) as i32;
            if descriptor.value_kind == ValueKind::Group {
                current_group = Some(descriptor.title);
                self.groups.push(OptionGroup {
                    title: current_group.clone().unwrap_or_default(),
                    option_names: Vec::new(),
                });
                continue;
            }
            if index > 0 && descriptor.name.is_empty() {
                continue;
            }
            let capabilities = Capabilities::from_bits_retain(descriptor.capabilities as u32);
            if is_omitted(capabilities) {
                continue;
            }
            let constraint = project_constraint(descriptor.value_kind, &descriptor.constraint)?;
            let decoded = OptionDescriptor {
                index,
                name: descriptor.name,
                title: descriptor.title,
                description: descriptor.description,
                value_kind: descriptor.value_kind,
                unit: descriptor.unit,
                size: descriptor.size,
                capabilities,
                constraint,
                group: current_group.clone(),
            };
            if let Some(group) = self.groups.last_mut() {
                if decoded.group.is_some() {
                    group.option_names.push(decoded.name.clone());
                }
            }
            self.by_name.insert(decoded.name.clone(), self.descriptors.len());
            self.descriptors.push(decoded);
        }
        self.loaded = true;
        Ok(())
    }

    pub fn descriptors(&self) -> &[OptionDescriptor] {
        &self.descriptors
    }

    pub fn groups(&self) -> &[OptionGroup] {
        &self.groups
    }

    pub fn by_name(&self, name: &str) -> Option<&OptionDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }
}

fn is_omitted(cap: Capabilities) -> bool {
    let soft_select = cap.contains(Capabilities::SOFT_SELECT);
    let hard_select = cap.contains(Capabilities::HARD_SELECT);
    let soft_detect = cap.contains(Capabilities::SOFT_DETECT);
    (soft_select && hard_select)
        || (soft_select && !soft_detect)
        || (!soft_select && !soft_detect && !hard_select)
}

fn project_constraint(kind: ValueKind, constraint: &WireConstraint) -> Result<OptionConstraint, Error> {
    match (kind, constraint) {
        (_, WireConstraint::None) => Ok(OptionConstraint::None),
        (ValueKind::Int, WireConstraint::Range { min, max, quant }) => Ok(OptionConstraint::RangeInt {
            min: *min,
            max: *max,
            quant: *quant,
        }),
        (ValueKind::Fixed, WireConstraint::Range { min, max, quant }) => Ok(OptionConstraint::RangeFixed {
            min: Fixed::from_bits(*min),
            max: Fixed::from_bits(*max),
            quant: Fixed::from_bits(*quant),
        }),
        (ValueKind::Int, WireConstraint::WordList(words)) => Ok(OptionConstraint::WordList(words.clone())),
        (ValueKind::Fixed, WireConstraint::WordList(words)) => {
            Ok(OptionConstraint::FixedList(words.iter().map(|&w| Fixed::from_bits(w)).collect()))
        }
        (ValueKind::String, WireConstraint::StringList(strings)) => {
            Ok(OptionConstraint::StringList(strings.clone()))
        }
        (other_kind, _) => {
            warn!(?other_kind, ?constraint, "unexpected constraint/valueKind pairing, treating as unconstrained");
            Ok(OptionConstraint::None)
        }
    }
}

/// Applies the write-info bits returned by a successful `SET_VALUE`/
/// `SET_AUTO`: invalidates (and optionally reloads) the descriptor cache.
pub(crate) fn apply_write_info<S: WithSession>(
    cache: &mut OptionCache,
    info: WriteInfo,
    session: &S,
    handle: i32,
) -> Result<(), Error> {
    if info.contains(WriteInfo::RELOAD_OPTIONS) {
        cache.invalidate();
        if info.contains(WriteInfo::RELOAD_PARAMETERS) {
            cache.ensure_loaded(session, handle)?;
        }
    }
    Ok(())
}

pub(crate) fn require(condition: bool, msg: impl Into<String>) -> Result<(), Error> {
    if condition {
        Ok(())
    } else {
        Err(Error::precondition(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omission_rule_matches_spec_table() {
        let none = Capabilities::empty();
        assert!(is_omitted(none));

        let soft_detect_only = Capabilities::SOFT_DETECT;
        assert!(!is_omitted(soft_detect_only));

        let soft_and_hard = Capabilities::SOFT_SELECT | Capabilities::HARD_SELECT | Capabilities::SOFT_DETECT;
        assert!(is_omitted(soft_and_hard));

        let soft_without_detect = Capabilities::SOFT_SELECT;
        assert!(is_omitted(soft_without_detect));

        let hard_only = Capabilities::HARD_SELECT;
        assert!(!is_omitted(hard_only));
    }

    #[test]
    fn range_constraint_projects_by_value_kind() {
        let wire = WireConstraint::Range { min: 0, max: 100, quant: 1 };
        assert_eq!(
            project_constraint(ValueKind::Int, &wire).unwrap(),
            OptionConstraint::RangeInt { min: 0, max: 100, quant: 1 }
        );
        match project_constraint(ValueKind::Fixed, &wire).unwrap() {
            OptionConstraint::RangeFixed { min, max, .. } => {
                assert_eq!(min.to_bits(), 0);
                assert_eq!(max.to_bits(), 100);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mismatched_constraint_becomes_unconstrained() {
        let wire = WireConstraint::StringList(vec!["a".into()]);
        assert_eq!(project_constraint(ValueKind::Int, &wire).unwrap(), OptionConstraint::None);
    }
}
