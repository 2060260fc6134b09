// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod columns;
pub mod enroll;
pub mod filter;
pub mod ids;
pub mod list;
pub mod model;
pub mod query;
pub mod rows;
pub mod toggle;

pub use columns::*;
pub use enroll::*;
pub use filter::*;
pub use ids::*;
pub use list::*;
pub use model::*;
pub use query::*;
pub use rows::*;
pub use toggle::*;
