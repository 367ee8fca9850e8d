use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    NoneSelected,
    Selected(Uuid),
}

/// Tracks the active chat partner; at most one at a time.
#[derive(Debug, Default)]
pub struct Selector {
    selection: Selection,
}

impl Selector {
    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn active(&self) -> Option<Uuid> {
        match self.selection {
            Selection::Selected(id) => Some(id),
            Selection::NoneSelected => None,
        }
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.active() == Some(id)
    }

    /// Returns `false` when `partner` is already selected.
    pub fn select(&mut self, partner: Uuid) -> bool {
        if self.is_active(partner) {
            return false;
        }
        self.selection = Selection::Selected(partner);
        true
    }

    /// Returns `false` when nothing was selected.
    pub fn deselect(&mut self) -> bool {
        std::mem::take(&mut self.selection) != Selection::NoneSelected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reselecting_is_a_no_op() {
        let mut selector = Selector::default();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        assert!(selector.select(a));
        assert!(!selector.select(a));
        assert!(selector.select(b));
        assert!(selector.is_active(b));
        assert!(!selector.is_active(a));
    }

    #[test]
    fn deselect_returns_to_none() {
        let mut selector = Selector::default();
        assert!(!selector.deselect());

        selector.select(Uuid::now_v7());
        assert!(selector.deselect());
        assert_eq!(selector.selection(), Selection::NoneSelected);
        assert_eq!(selector.active(), None);
    }
}
