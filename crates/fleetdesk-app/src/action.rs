// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Fetch,
    Delete,
    Update,
    Create,
}

impl ActionKind {
    pub const ALL: [Self; 4] = [Self::Fetch, Self::Delete, Self::Update, Self::Create];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "load",
            Self::Delete => "delete",
            Self::Update => "update",
            Self::Create => "create",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Fetch => 0,
            Self::Delete => 1,
            Self::Update => 2,
            Self::Create => 3,
        }
    }

    pub const fn needs_confirmation(self) -> bool {
        matches!(self, Self::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionPhase {
    #[default]
    Idle,
    Confirming,
    InFlight,
    Succeeded,
    Failed,
}

impl ActionPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{} already in progress -- wait for it to finish", .0.as_str())]
pub struct ActionBusy(pub ActionKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionTracker {
    phases: [ActionPhase; 4],
}

impl ActionTracker {
    pub fn phase(&self, kind: ActionKind) -> ActionPhase {
        self.phases[kind.slot()]
    }

    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.phase(kind) == ActionPhase::InFlight
    }

    pub fn request_confirmation(&mut self, kind: ActionKind) -> Result<(), ActionBusy> {
        if self.is_busy(kind) {
            return Err(ActionBusy(kind));
        }
        self.phases[kind.slot()] = if kind.needs_confirmation() {
            ActionPhase::Confirming
        } else {
            ActionPhase::Idle
        };
        Ok(())
    }

    pub fn cancel(&mut self, kind: ActionKind) {
        if self.phase(kind) == ActionPhase::Confirming {
            self.phases[kind.slot()] = ActionPhase::Idle;
        }
    }

    pub fn begin(&mut self, kind: ActionKind) -> Result<(), ActionBusy> {
        if self.is_busy(kind) {
            return Err(ActionBusy(kind));
        }
        self.phases[kind.slot()] = ActionPhase::InFlight;
        Ok(())
    }

    pub fn settle(&mut self, kind: ActionKind, succeeded: bool) {
        if self.is_busy(kind) {
            self.phases[kind.slot()] = if succeeded {
                ActionPhase::Succeeded
            } else {
                ActionPhase::Failed
            };
        }
    }

    pub fn dismiss(&mut self, kind: ActionKind) {
        if self.phase(kind).is_terminal() {
            self.phases[kind.slot()] = ActionPhase::Idle;
        }
    }

    pub fn dismiss_all(&mut self) {
        for kind in ActionKind::ALL {
            self.dismiss(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionBusy, ActionKind, ActionPhase, ActionTracker};

    #[test]
    fn delete_walks_the_full_machine() {
        let mut tracker = ActionTracker::default();
        tracker
            .request_confirmation(ActionKind::Delete)
            .expect("idle delete can ask");
        assert_eq!(tracker.phase(ActionKind::Delete), ActionPhase::Confirming);

        tracker.begin(ActionKind::Delete).expect("confirmed delete starts");
        assert!(tracker.is_busy(ActionKind::Delete));

        tracker.settle(ActionKind::Delete, false);
        assert_eq!(tracker.phase(ActionKind::Delete), ActionPhase::Failed);

        tracker.dismiss(ActionKind::Delete);
        assert_eq!(tracker.phase(ActionKind::Delete), ActionPhase::Idle);
    }

    #[test]
    fn fetch_skips_confirmation() {
        let mut tracker = ActionTracker::default();
        tracker
            .request_confirmation(ActionKind::Fetch)
            .expect("fetch never blocks on confirm");
        assert_eq!(tracker.phase(ActionKind::Fetch), ActionPhase::Idle);
    }

    #[test]
    fn in_flight_action_refuses_resubmission() {
        let mut tracker = ActionTracker::default();
        tracker.begin(ActionKind::Update).expect("first update starts");
        assert_eq!(
            tracker.begin(ActionKind::Update),
            Err(ActionBusy(ActionKind::Update))
        );
        assert_eq!(
            tracker.request_confirmation(ActionKind::Update),
            Err(ActionBusy(ActionKind::Update))
        );
        tracker.begin(ActionKind::Delete).expect("other kinds are independent");

        tracker.settle(ActionKind::Update, true);
        assert_eq!(tracker.phase(ActionKind::Update), ActionPhase::Succeeded);
        tracker.begin(ActionKind::Update).expect("settled update can rerun");
    }

    #[test]
    fn cancel_only_leaves_confirming() {
        let mut tracker = ActionTracker::default();
        tracker.begin(ActionKind::Delete).expect("starts");
        tracker.cancel(ActionKind::Delete);
        assert!(tracker.is_busy(ActionKind::Delete));

        let mut tracker = ActionTracker::default();
        tracker
            .request_confirmation(ActionKind::Delete)
            .expect("asks");
        tracker.cancel(ActionKind::Delete);
        assert_eq!(tracker.phase(ActionKind::Delete), ActionPhase::Idle);
    }

    #[test]
    fn busy_message_names_the_action() {
        assert_eq!(
            ActionBusy(ActionKind::Delete).to_string(),
            "delete already in progress -- wait for it to finish"
        );
    }
}
