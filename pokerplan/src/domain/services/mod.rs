mod reconcile_worker;

pub use reconcile_worker::*;
