// Status table and role policy, free of I/O
pub mod order_status;
// Order reads and mutations backed by the order store
pub mod orders;
