// Order fulfillment core
pub mod checkout;
pub mod customers;
pub mod inventory;
pub mod orders;

// Asynchronous payment outcomes
pub mod reconciliation;
