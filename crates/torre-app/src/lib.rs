// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod backend;
pub mod bulk;
pub mod filter;
pub mod forms;
pub mod ids;
pub mod import;
pub mod model;
pub mod selection;
pub mod staleness;
pub mod state;

pub use backend::*;
pub use bulk::*;
pub use filter::*;
pub use forms::*;
pub use ids::*;
pub use import::*;
pub use model::*;
pub use selection::*;
pub use staleness::*;
pub use state::*;
