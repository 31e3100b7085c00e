// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: validate, authorize, forward, retry.

pub mod executor;
pub mod front;

pub use executor::RequestExecutor;
pub use front::{DispatchSettings, Dispatcher};
