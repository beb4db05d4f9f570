//! The recipient's "No" button. Purely cosmetic: it dodges and never reaches the service.

/// Escalating copy for a button that keeps getting evaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclineButton {
    evasions: u32,
}

impl DeclineButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evasions(&self) -> u32 {
        self.evasions
    }

    /// Record one dodge and return the new label.
    pub fn evade(&mut self) -> &'static str {
        self.evasions = self.evasions.saturating_add(1);
        self.label()
    }

    pub fn label(&self) -> &'static str {
        match self.evasions {
            0 => "No",
            1 | 2 => "Are you sure?",
            _ => "Really? 😢",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn copy_escalates_with_evasions() {
        let mut button = DeclineButton::new();
        assert_eq!(button.label(), "No");
        assert_eq!(button.evade(), "Are you sure?");
        assert_eq!(button.evade(), "Are you sure?");
        assert_eq!(button.evade(), "Really? 😢");
        assert_eq!(button.evade(), "Really? 😢");
        assert_eq!(button.evasions(), 4);
    }

    proptest! {
        #[test]
        fn label_depends_only_on_evasion_count(count in 0u32..50) {
            let mut button = DeclineButton::new();
            for _ in 0..count {
                button.evade();
            }
            let expected = match count {
                0 => "No",
                1 | 2 => "Are you sure?",
                _ => "Really? 😢",
            };
            prop_assert_eq!(button.label(), expected);
        }
    }
}
