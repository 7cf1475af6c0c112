// Purchasing
pub mod orders;
pub mod sequences;
pub mod suppliers;

// Cost control
pub mod budgets;
pub mod cost_centers;

// Reporting and documents
pub mod dashboard;
pub mod documents;
