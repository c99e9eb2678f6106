pub mod invoices;
pub mod settlement;
