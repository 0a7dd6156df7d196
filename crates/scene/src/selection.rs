use foundation::{Feature, FeatureRef};

/// Feature-state flag names projected into the rendering runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    Hover,
    Selected,
}

impl StateKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StateKey::Hover => "hover",
            StateKey::Selected => "selected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureStateOp {
    Set { target: FeatureRef, key: StateKey },
    Clear { target: FeatureRef, key: StateKey },
}

/// At most one hovered and one selected feature.
///
/// Every transition returns the feature-state operations that bring the
/// runtime in line. Hover and selection are independent flags, so clearing
/// one never touches the other even on the same feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    hovered: Option<FeatureRef>,
    selected: Option<FeatureRef>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hovered(&self) -> Option<&FeatureRef> {
        self.hovered.as_ref()
    }

    pub fn selected(&self) -> Option<&FeatureRef> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, target: &FeatureRef) -> bool {
        self.selected.as_ref() == Some(target)
    }

    pub fn hover(&mut self, target: FeatureRef) -> Vec<FeatureStateOp> {
        replace(&mut self.hovered, Some(target), StateKey::Hover)
    }

    pub fn clear_hover(&mut self) -> Vec<FeatureStateOp> {
        replace(&mut self.hovered, None, StateKey::Hover)
    }

    pub fn select(&mut self, target: FeatureRef) -> Vec<FeatureStateOp> {
        replace(&mut self.selected, Some(target), StateKey::Selected)
    }

    pub fn clear_selection(&mut self) -> Vec<FeatureStateOp> {
        replace(&mut self.selected, None, StateKey::Selected)
    }

    /// Operations that restore both flags on a freshly rebuilt runtime.
    pub fn reapply(&self) -> Vec<FeatureStateOp> {
        let hovered = self.hovered.iter().map(|t| (t, StateKey::Hover));
        let selected = self.selected.iter().map(|t| (t, StateKey::Selected));
        hovered
            .chain(selected)
            .map(|(target, key)| FeatureStateOp::Set {
                target: target.clone(),
                key,
            })
            .collect()
    }
}

fn replace(
    slot: &mut Option<FeatureRef>,
    next: Option<FeatureRef>,
    key: StateKey,
) -> Vec<FeatureStateOp> {
    if *slot == next {
        return Vec::new();
    }
    let mut ops = Vec::with_capacity(2);
    if let Some(previous) = slot.take() {
        ops.push(FeatureStateOp::Clear {
            target: previous,
            key,
        });
    }
    if let Some(target) = next {
        ops.push(FeatureStateOp::Set {
            target: target.clone(),
            key,
        });
        *slot = Some(target);
    }
    ops
}

/// Human-readable name for a clicked country: `name_en`, then `name`, then
/// the country code.
pub fn resolve_display_name(feature: &Feature, code: &str) -> String {
    feature
        .str_property("name_en")
        .or_else(|| feature.str_property("name"))
        .unwrap_or(code)
        .to_string()
}

#[cfg(test)]
mod tests {
    use foundation::{Feature, FeatureId, FeatureRef};
    use pretty_assertions::assert_eq;

    use super::{FeatureStateOp, SelectionState, StateKey, resolve_display_name};

    fn country(id: u64) -> FeatureRef {
        FeatureRef::new("countries", Some("country_boundaries"), FeatureId::Number(id))
    }

    #[test]
    fn hover_moves_flag_between_features() {
        let mut s = SelectionState::new();
        assert_eq!(
            s.hover(country(1)),
            vec![FeatureStateOp::Set {
                target: country(1),
                key: StateKey::Hover
            }]
        );
        assert!(s.hover(country(1)).is_empty());
        assert_eq!(
            s.hover(country(2)),
            vec![
                FeatureStateOp::Clear {
                    target: country(1),
                    key: StateKey::Hover
                },
                FeatureStateOp::Set {
                    target: country(2),
                    key: StateKey::Hover
                },
            ]
        );
    }

    #[test]
    fn clearing_hover_leaves_selection_alone() {
        let mut s = SelectionState::new();
        s.select(country(7));
        s.hover(country(7));

        let ops = s.clear_hover();
        assert_eq!(
            ops,
            vec![FeatureStateOp::Clear {
                target: country(7),
                key: StateKey::Hover
            }]
        );
        assert_eq!(s.selected(), Some(&country(7)));
        assert!(s.clear_hover().is_empty());
    }

    #[test]
    fn reapply_restores_both_flags() {
        let mut s = SelectionState::new();
        s.hover(country(1));
        s.select(country(2));
        assert_eq!(
            s.reapply(),
            vec![
                FeatureStateOp::Set {
                    target: country(1),
                    key: StateKey::Hover
                },
                FeatureStateOp::Set {
                    target: country(2),
                    key: StateKey::Selected
                },
            ]
        );
    }

    #[test]
    fn display_name_falls_back_to_code() {
        let f = Feature::new(None, None)
            .with_property("name", "Deutschland")
            .with_property("name_en", "Germany");
        assert_eq!(resolve_display_name(&f, "DEU"), "Germany");

        let f = Feature::new(None, None).with_property("name", "Sverige");
        assert_eq!(resolve_display_name(&f, "SWE"), "Sverige");

        let f = Feature::new(None, None).with_property("name_en", "");
        assert_eq!(resolve_display_name(&f, "XKX"), "XKX");
    }
}
