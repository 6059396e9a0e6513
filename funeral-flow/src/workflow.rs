//! The four-step booking wizard and its stepper bar.

use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::form::FormField;

/// Pages of the booking wizard, in order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Format,
    Logistics,
    Package,
    Documents,
}

impl Step {
    pub const ALL: [Step; 4] = [Self::Format, Self::Logistics, Self::Package, Self::Documents];

    pub fn index(&self) -> usize {
        match self {
            Self::Format => 0,
            Self::Logistics => 1,
            Self::Package => 2,
            Self::Documents => 3,
        }
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(BookingError::StepNotFound(index))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Format => "Format",
            Self::Logistics => "Logistics",
            Self::Package => "Package",
            Self::Documents => "Documents",
        }
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<Self> {
        self.index().checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    /// The package chooser is only shown while choosing the package.
    pub fn shows_package_chooser(&self) -> bool {
        *self == Self::Package
    }

    /// The floating price summary appears once the format has been picked.
    pub fn shows_price_summary(&self) -> bool {
        self.index() >= 1
    }

    /// Fields edited on this step's page
    pub fn fields(&self) -> Vec<FormField> {
        FormField::ALL
            .into_iter()
            .filter(|field| field.step() == *self)
            .collect()
    }
}

/// Defines where the wizard should go on a step-change request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "step")]
pub enum Navigation {
    /// Move to the next step; stays put on the last one
    #[serde(rename = "next")]
    Continue,
    /// Move to the previous step; stays put on the first one
    #[serde(rename = "back")]
    GoBack,
    /// Jump to a step by index
    #[serde(rename = "goto")]
    GoTo(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Active,
    Pending,
}

/// One segment of the stepper bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepIndicator {
    pub step: Step,
    pub index: usize,
    pub label: String,
    pub status: StepStatus,
}

/// Tracks which page of the wizard is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Wizard {
    current: Step,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(step: Step) -> Self {
        Self { current: step }
    }

    pub fn current(&self) -> Step {
        self.current
    }

    /// Apply a navigation request and return the step that is now active.
    /// An out-of-range jump is rejected and leaves the wizard where it was.
    pub fn navigate(&mut self, navigation: Navigation) -> Result<Step> {
        self.current = match navigation {
            Navigation::Continue => self.current.next().unwrap_or(self.current),
            Navigation::GoBack => self.current.previous().unwrap_or(self.current),
            Navigation::GoTo(index) => Step::from_index(index)?,
        };
        Ok(self.current)
    }

    pub fn indicators(&self) -> Vec<StepIndicator> {
        Step::ALL
            .into_iter()
            .map(|step| StepIndicator {
                step,
                index: step.index(),
                label: step.label().to_string(),
                status: match step.cmp(&self.current) {
                    std::cmp::Ordering::Less => StepStatus::Completed,
                    std::cmp::Ordering::Equal => StepStatus::Active,
                    std::cmp::Ordering::Greater => StepStatus::Pending,
                },
            })
            .collect()
    }
}
