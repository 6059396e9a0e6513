//! BookingSession – the state behind one booking wizard.
//!
//! A session restores its draft exactly once, when it is opened, and then
//! follows a simple rule: every change to the form snapshot is persisted
//! immediately, and prices are recomputed on every read. Step navigation and
//! the cemetery category are session state only; they are not part of the
//! draft.
//!
//! ```rust,ignore
//! let drafts = DraftStore::new(Arc::new(InMemoryKeyValueStore::new()), &config);
//! let mut session = BookingSession::open("profile-1", drafts, config.prices.clone());
//! session.update_field("hasHall", json!(true))?;
//! session.navigate(Navigation::Continue)?;
//! let view = session.view();
//! ```

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    draft::{DraftStore, LoadOutcome, SaveOutcome},
    error::Result,
    form::{FieldUpdate, FormSnapshot},
    pricing::{CemeteryCategory, PriceBreakdown, PriceTable},
    workflow::{Navigation, Step, StepIndicator, Wizard},
};

/// Everything a front-end needs to render the wizard
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub form: FormSnapshot,
    pub step: Step,
    pub step_index: usize,
    pub category: Option<CemeteryCategory>,
    pub steps: Vec<StepIndicator>,
    pub shows_package_chooser: bool,
    /// Present once the floating price summary is visible
    pub price_summary: Option<PriceBreakdown>,
}

pub struct BookingSession {
    id: String,
    form: FormSnapshot,
    wizard: Wizard,
    category: Option<CemeteryCategory>,
    drafts: DraftStore,
    prices: PriceTable,
    load_outcome: LoadOutcome,
    last_save: Option<SaveOutcome>,
}

impl BookingSession {
    /// Open a session and restore its draft, if any.
    pub fn open(id: impl Into<String>, drafts: DraftStore, prices: PriceTable) -> Self {
        let id = id.into();
        let (form, load_outcome) = drafts.load();
        info!(session_id = %id, outcome = ?load_outcome, "Opened booking session");

        Self {
            id,
            form,
            wizard: Wizard::new(),
            category: Some(CemeteryCategory::Standard),
            drafts,
            prices,
            load_outcome,
            last_save: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn form(&self) -> &FormSnapshot {
        &self.form
    }

    pub fn step(&self) -> Step {
        self.wizard.current()
    }

    pub fn category(&self) -> Option<CemeteryCategory> {
        self.category
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn last_save(&self) -> Option<&SaveOutcome> {
        self.last_save.as_ref()
    }

    /// Apply one `(fieldName, newValue)` edit and persist the draft.
    pub fn update_field(&mut self, field: &str, value: Value) -> Result<SaveOutcome> {
        self.form.apply_update(FieldUpdate::new(field, value))?;
        debug!(session_id = %self.id, field = %field, "Updated field");
        Ok(self.persist())
    }

    /// Apply a batch of edits, all or nothing, and persist the draft once.
    pub fn update_fields(&mut self, updates: Vec<FieldUpdate>) -> Result<SaveOutcome> {
        let count = updates.len();
        self.form.apply_all(updates)?;
        debug!(session_id = %self.id, count, "Updated fields");
        Ok(self.persist())
    }

    pub fn navigate(&mut self, navigation: Navigation) -> Result<Step> {
        let step = self.wizard.navigate(navigation)?;
        debug!(session_id = %self.id, step = ?step, "Changed step");
        Ok(step)
    }

    /// `None` stands for a category the chooser did not recognise.
    pub fn set_category(&mut self, category: Option<CemeteryCategory>) {
        self.category = category;
    }

    pub fn total(&self) -> i64 {
        self.prices.total(&self.form, self.category)
    }

    pub fn breakdown(&self) -> PriceBreakdown {
        self.prices.breakdown(&self.form, self.category)
    }

    pub fn view(&self) -> SessionView {
        let step = self.step();
        SessionView {
            session_id: self.id.clone(),
            form: self.form.clone(),
            step,
            step_index: step.index(),
            category: self.category,
            steps: self.wizard.indicators(),
            shows_package_chooser: step.shows_package_chooser(),
            price_summary: step.shows_price_summary().then(|| self.breakdown()),
        }
    }

    /// Drop the draft and start over from the default snapshot.
    pub fn reset(&mut self) {
        if let Err(e) = self.drafts.clear() {
            error!(session_id = %self.id, error = %e, "Failed to clear draft");
        }
        self.form = FormSnapshot::default();
        self.wizard = Wizard::new();
        self.last_save = None;
        info!(session_id = %self.id, "Reset booking session");
    }

    fn persist(&mut self) -> SaveOutcome {
        let outcome = self.drafts.save(&self.form);
        self.last_save = Some(outcome.clone());
        outcome
    }
}
