// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod action;
pub mod dispatch;
pub mod forms;
pub mod ids;
pub mod model;
pub mod remote;
pub mod row;
pub mod state;
pub mod table;

pub use action::*;
pub use dispatch::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use remote::*;
pub use row::*;
pub use state::*;
pub use table::*;
