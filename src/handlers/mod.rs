pub mod auth;
pub mod budgets;
pub mod common;
pub mod cost_centers;
pub mod dashboard;
pub mod orders;
pub mod pages;
pub mod pdf;
pub mod suppliers;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        budgets::BudgetService, cost_centers::CostCenterService, dashboard::DashboardService,
        documents::{DocumentService, PdfRenderer},
        orders::OrderService,
        suppliers::SupplierService,
    },
};
use std::sync::Arc;

pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub suppliers: Arc<SupplierService>,
    pub orders: Arc<OrderService>,
    pub cost_centers: Arc<CostCenterService>,
    pub budgets: Arc<BudgetService>,
    pub dashboard: Arc<DashboardService>,
    pub documents: Arc<DocumentService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig, renderer: Arc<dyn PdfRenderer>) -> Self {
        let currency = config.currency();
        let orders = OrderService::new(db_pool.clone(), currency);

        Self {
            suppliers: Arc::new(SupplierService::new(db_pool.clone(), currency)),
            cost_centers: Arc::new(CostCenterService::new(db_pool.clone(), currency)),
            budgets: Arc::new(BudgetService::new(db_pool.clone(), currency)),
            dashboard: Arc::new(DashboardService::new(db_pool)),
            documents: Arc::new(DocumentService::new(
                orders.clone(),
                renderer,
                config.company.clone(),
            )),
            orders: Arc::new(orders),
        }
    }
}
