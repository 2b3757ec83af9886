//! Applications runnable by the workers.

pub mod wc;
