//! Database entities.

pub mod budget;
pub mod cost_center;
pub mod document_sequence;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod supplier;
pub mod supplier_product;
