use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

use crate::entities::stock::{self, Entity as Stock, Model as StockModel};
use crate::repositories::Repository;

use super::{BaseRepository, StockStore};

/// Repository for stock rows
#[derive(Debug, Clone)]
pub struct StockRepository {
    base: BaseRepository,
}

impl StockRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for StockRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl StockStore for StockRepository {
    async fn find_stock(&self, product_id: i64) -> Result<Option<StockModel>, DbErr> {
        Stock::find()
            .filter(stock::Column::ProductId.eq(product_id))
            .one(self.get_db())
            .await
    }

    async fn decrement_stock(&self, product_id: i64, quantity: i32) -> Result<u64, DbErr> {
        let result = Stock::update_many()
            .col_expr(
                stock::Column::Quantity,
                Expr::col(stock::Column::Quantity).sub(quantity),
            )
            .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock::Column::ProductId.eq(product_id))
            .exec(self.get_db())
            .await?;

        Ok(result.rows_affected)
    }

    async fn restock(&self, product_id: i64, quantity: i32) -> Result<StockModel, DbErr> {
        let now = Utc::now();
        let row = stock::ActiveModel {
            product_id: Set(product_id),
            quantity: Set(quantity),
            last_stocked_date: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };

        // Single statement so concurrent restocks of a new product cannot
        // both attempt the insert
        Stock::insert(row)
            .on_conflict(
                OnConflict::column(stock::Column::ProductId)
                    .update_columns([
                        stock::Column::Quantity,
                        stock::Column::LastStockedDate,
                        stock::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.get_db())
            .await?;

        self.find_stock(product_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("stock for product {}", product_id)))
    }

    async fn list_stock(&self) -> Result<Vec<StockModel>, DbErr> {
        Stock::find()
            .order_by_asc(stock::Column::ProductId)
            .all(self.get_db())
            .await
    }
}
