//! Per-`(path, short_server_id)` notification attributes: `pmin`/`pmax`/
//! `gt`/`lt`/`st`, with assignment-level precedence (resource overrides
//! instance overrides object) and the periodic tick that decides whether
//! an observed value change is worth notifying.

use std::time::Duration;

use crate::error::CoreError;

/// One level's worth of settable attributes. `None` means "not set at
/// this level"; normalization re-inherits from the nearest ancestor that
/// has a value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttributeSet {
    /// Minimum seconds between notifications.
    pub pmin: Option<u32>,
    /// Maximum seconds before a notification is forced regardless of
    /// value change.
    pub pmax: Option<u32>,
    /// Notify only when the value rises above this threshold.
    pub gt: Option<f64>,
    /// Notify only when the value falls below this threshold.
    pub lt: Option<f64>,
    /// Notify only when the value changes by at least this step.
    pub st: Option<f64>,
}

impl AttributeSet {
    /// Fill every unset field in `self` from `parent` (object fills
    /// instance, instance fills resource).
    pub fn inherit_from(mut self, parent: &AttributeSet) -> Self {
        self.pmin = self.pmin.or(parent.pmin);
        self.pmax = self.pmax.or(parent.pmax);
        self.gt = self.gt.or(parent.gt);
        self.lt = self.lt.or(parent.lt);
        self.st = self.st.or(parent.st);
        self
    }

    /// Validate the invariants a write-attribute request must satisfy:
    /// `pmin <= pmax`, and if both `gt`/`lt` are set, `lt <= gt` and
    /// `lt + 2*st <= gt`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let (Some(pmin), Some(pmax)) = (self.pmin, self.pmax) {
            if pmin > pmax {
                return Err(CoreError::InvalidArgument("pmin must be <= pmax"));
            }
        }
        if let (Some(gt), Some(lt)) = (self.gt, self.lt) {
            if lt > gt {
                return Err(CoreError::InvalidArgument("lt must be <= gt"));
            }
            let step = self.st.unwrap_or(0.0);
            if lt + 2.0 * step > gt {
                return Err(CoreError::InvalidArgument("lt + 2*st must be <= gt"));
            }
        }
        Ok(())
    }
}

/// Runtime tracking state for one observed `(path, short_server_id)`
/// pair: elapsed time since the last notification and the value last
/// notified, so threshold crossings can be detected.
#[derive(Debug, Clone, Default)]
pub struct AttributeState {
    /// Effective (post-inheritance) attribute set.
    pub attributes: AttributeSet,
    age_since_notify: Duration,
    prev_value: Option<f64>,
}

/// What a tick of [`AttributeState::evaluate`] decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyDecision {
    /// Don't notify yet.
    Skip,
    /// Notify: `pmax` forced it regardless of value change.
    NotifyPmaxExpired,
    /// Notify: `pmin` had elapsed and the value crossed a threshold.
    NotifyThresholdCrossed,
}

impl AttributeState {
    /// A fresh tracker for `attributes`, with no notification sent yet.
    pub fn new(attributes: AttributeSet) -> Self {
        Self { attributes, age_since_notify: Duration::ZERO, prev_value: None }
    }

    /// Advance the age counter by `elapsed` and decide whether to notify
    /// for `current_value` (`None` for non-numeric resources, which can
    /// still be pmax-driven but never threshold-driven).
    pub fn evaluate(&mut self, elapsed: Duration, current_value: Option<f64>) -> NotifyDecision {
        self.age_since_notify += elapsed;

        let pmax_expired = self
            .attributes
            .pmax
            .is_some_and(|pmax| self.age_since_notify >= Duration::from_secs(u64::from(pmax)));
        if pmax_expired {
            self.record_notify(current_value);
            return NotifyDecision::NotifyPmaxExpired;
        }

        let pmin_elapsed = self
            .attributes
            .pmin
            .is_none_or(|pmin| self.age_since_notify >= Duration::from_secs(u64::from(pmin)));
        if !pmin_elapsed {
            return NotifyDecision::Skip;
        }

        if let Some(value) = current_value {
            if self.crossed_threshold(value) {
                self.record_notify(Some(value));
                return NotifyDecision::NotifyThresholdCrossed;
            }
        }

        NotifyDecision::Skip
    }

    fn crossed_threshold(&self, value: f64) -> bool {
        let gt_crossed = self.attributes.gt.is_some_and(|gt| value > gt);
        let lt_crossed = self.attributes.lt.is_some_and(|lt| value < lt);
        let step_crossed = match (self.attributes.st, self.prev_value) {
            (Some(st), Some(prev)) => (value - prev).abs() >= st,
            (Some(_), None) => true,
            (None, _) => self.attributes.gt.is_none() && self.attributes.lt.is_none(),
        };
        gt_crossed || lt_crossed || step_crossed
    }

    fn record_notify(&mut self, value: Option<f64>) {
        self.age_since_notify = Duration::ZERO;
        if let Some(v) = value {
            self.prev_value = Some(v);
        }
    }
}
