use crate::money::Currency;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Monthly allotment for one cost center in one currency.
///
/// `(cost_center_id, month, currency)` is unique.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub cost_center_id: i32,
    /// `YYYY-MM`
    pub month: String,
    pub currency: Currency,
    pub amount: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub approver: Option<String>,
    /// Utilization percent above which usage is `warning`
    pub warning_threshold: Option<Decimal>,
    /// Utilization percent above which usage is `critical`
    pub critical_threshold: Option<Decimal>,
    /// Percent allowed above the budget before usage is flagged over limit
    pub overspend_limit: Option<Decimal>,
    pub auto_adjust: bool,
    pub rollover_unused: bool,
    pub require_approval: bool,
    pub email_alerts: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cost_center::Entity",
        from = "Column::CostCenterId",
        to = "super::cost_center::Column::Id",
        on_delete = "Cascade"
    )]
    CostCenter,
}

impl Related<super::cost_center::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CostCenter.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = self;
        let now = Utc::now();
        if insert {
            model.created_at = Set(now);
        }
        model.updated_at = Set(now);
        Ok(model)
    }
}
