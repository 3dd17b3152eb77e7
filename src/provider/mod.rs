use crate::ProviderSelection;
use crate::wizard::Wizard;

/// What the selector should draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorState {
    Loading,
    /// The backend reported zero configured providers.
    Empty,
    Ready(Vec<ProviderSelection>),
    Failed(String),
}

/// Cards for each configured provider/sub_type pair.
#[derive(Debug, Clone)]
pub struct ProviderSelector {
    state: SelectorState,
    pub selected: usize,
}

impl Default for ProviderSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderSelector {
    pub fn new() -> Self {
        Self {
            state: SelectorState::Loading,
            selected: 0,
        }
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    /// Back to the loading state, e.g. before a refresh.
    pub fn reload(&mut self) {
        self.state = SelectorState::Loading;
        self.selected = 0;
    }

    /// Install the backend's list. Duplicates are dropped, order is kept.
    pub fn load(&mut self, providers: Vec<ProviderSelection>) {
        let mut cards: Vec<ProviderSelection> = Vec::with_capacity(providers.len());
        for p in providers {
            if !cards.contains(&p) {
                cards.push(p);
            }
        }

        self.selected = 0;
        self.state = if cards.is_empty() {
            SelectorState::Empty
        } else {
            SelectorState::Ready(cards)
        };
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = SelectorState::Failed(message.into());
    }

    pub fn cards(&self) -> &[ProviderSelection] {
        match &self.state {
            SelectorState::Ready(cards) => cards,
            _ => &[],
        }
    }

    /// Move selection down (clamp to end).
    pub fn select_next(&mut self) {
        let len = self.cards().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    /// Move selection up (clamp to start).
    pub fn select_prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn selected_card(&self) -> Option<&ProviderSelection> {
        self.cards().get(self.selected)
    }

    /// Point the cursor at the card matching the wizard's current choice.
    pub fn sync_with(&mut self, wizard: &Wizard) {
        if let Some(current) = wizard.selection()
            && let Some(idx) = self.cards().iter().position(|c| *c == current)
        {
            self.selected = idx;
        }
    }

    /// Write the highlighted card into the wizard's form data.
    pub fn choose(&self, wizard: &mut Wizard) -> Option<ProviderSelection> {
        let card = self.selected_card()?.clone();
        wizard.select_provider(&card);
        Some(card)
    }
}
