use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

use crate::entities::order::{self, Entity as Order, Model as OrderModel};
use crate::entities::order_detail::{self, Entity as OrderDetail, Model as OrderDetailModel};
use crate::repositories::Repository;

use super::{BaseRepository, NewOrder, NewOrderDetail, OrderStore};

/// Repository for order operations
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert_order(&self, new_order: NewOrder) -> Result<OrderModel, DbErr> {
        order::ActiveModel {
            item_count: Set(new_order.item_count),
            total_excl_tax: Set(new_order.total_excl_tax),
            total_incl_tax: Set(new_order.total_incl_tax),
            order_date: Set(new_order.order_date),
            ..Default::default()
        }
        .insert(self.get_db())
        .await
    }

    async fn insert_order_details(&self, details: Vec<NewOrderDetail>) -> Result<(), DbErr> {
        if details.is_empty() {
            return Ok(());
        }

        let rows = details.into_iter().map(|d| order_detail::ActiveModel {
            order_id: Set(d.order_id),
            product_id: Set(d.product_id),
            quantity: Set(d.quantity),
            unit_price_excl_tax: Set(d.unit_price_excl_tax),
            unit_price_incl_tax: Set(d.unit_price_incl_tax),
            subtotal_excl_tax: Set(d.subtotal_excl_tax),
            subtotal_incl_tax: Set(d.subtotal_incl_tax),
            ..Default::default()
        });

        OrderDetail::insert_many(rows).exec(self.get_db()).await?;
        Ok(())
    }

    async fn delete_order(&self, order_id: i64) -> Result<u64, DbErr> {
        let result = Order::delete_by_id(order_id).exec(self.get_db()).await?;
        Ok(result.rows_affected)
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<OrderModel>, DbErr> {
        Order::find_by_id(order_id).one(self.get_db()).await
    }

    async fn find_order_details(&self, order_id: i64) -> Result<Vec<OrderDetailModel>, DbErr> {
        OrderDetail::find()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .order_by_asc(order_detail::Column::Id)
            .all(self.get_db())
            .await
    }

    async fn list_orders(&self, page: u64, limit: u64) -> Result<(Vec<OrderModel>, u64), DbErr> {
        let paginator = Order::find()
            .order_by_desc(order::Column::OrderDate)
            .order_by_desc(order::Column::Id)
            .paginate(self.get_db(), limit.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }
}
