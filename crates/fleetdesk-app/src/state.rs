// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Nav,
    Filter,
    Edit,
    Confirm,
    SignIn,
    Detail,
}

impl AppMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Nav => "NAV",
            Self::Filter => "FILTER",
            Self::Edit => "EDIT",
            Self::Confirm => "CONFIRM",
            Self::SignIn => "SIGN IN",
            Self::Detail => "DETAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_tab: Collection,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Collection::Contracts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    NextTab,
    PrevTab,
    SelectTab(Collection),
    EnterFilter,
    EnterEdit,
    AskConfirm,
    EnterSignIn,
    ShowDetail,
    ExitToNav,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    TabChanged(Collection),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn new(start_tab: Collection) -> Self {
        Self {
            mode: AppMode::Nav,
            active_tab: start_tab,
            status_line: None,
        }
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextTab => self.rotate_tab(1),
            AppCommand::PrevTab => self.rotate_tab(-1),
            AppCommand::SelectTab(collection) => {
                if collection == self.active_tab {
                    return Vec::new();
                }
                self.active_tab = collection;
                self.mode = AppMode::Nav;
                vec![AppEvent::TabChanged(collection)]
            }
            AppCommand::EnterFilter => self.enter(AppMode::Filter),
            AppCommand::EnterEdit => self.enter(AppMode::Edit),
            AppCommand::AskConfirm => self.enter(AppMode::Confirm),
            AppCommand::EnterSignIn => self.enter(AppMode::SignIn),
            AppCommand::ShowDetail => self.enter(AppMode::Detail),
            AppCommand::ExitToNav => {
                if self.mode == AppMode::Nav {
                    return Vec::new();
                }
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) -> AppEvent {
        let message = message.into();
        self.status_line = Some(message.clone());
        AppEvent::StatusUpdated(message)
    }

    fn enter(&mut self, mode: AppMode) -> Vec<AppEvent> {
        self.mode = mode;
        vec![AppEvent::ModeChanged(mode)]
    }

    // Only from nav mode, so an open overlay keeps its target.
    fn rotate_tab(&mut self, delta: isize) -> Vec<AppEvent> {
        if self.mode != AppMode::Nav {
            return Vec::new();
        }
        let tabs = Collection::ALL;
        let current = tabs
            .iter()
            .position(|tab| *tab == self.active_tab)
            .unwrap_or(0) as isize;
        let len = tabs.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.active_tab = tabs[next];
        vec![AppEvent::TabChanged(self.active_tab)]
    }
}
