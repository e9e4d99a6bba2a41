use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;

use crate::entities::product::{self, Entity as Product, Model as ProductModel};
use crate::entities::stock::{self, Model as StockModel};
use crate::repositories::Repository;

use super::BaseRepository;

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub unit_price_excl_tax: Decimal,
    pub unit_price_incl_tax: Decimal,
}

/// Repository for the product catalog
#[derive(Debug, Clone)]
pub struct ProductRepository {
    base: BaseRepository,
}

impl ProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Creates a product and, when `initial_stock` is given, its stock row.
    /// Both rows commit together or not at all.
    pub async fn create(
        &self,
        new_product: NewProduct,
        initial_stock: Option<i32>,
    ) -> Result<(ProductModel, Option<StockModel>), DbErr> {
        let txn = self.get_db().begin().await?;

        let created = product::ActiveModel {
            name: Set(new_product.name),
            description: Set(new_product.description),
            unit_price_excl_tax: Set(new_product.unit_price_excl_tax),
            unit_price_incl_tax: Set(new_product.unit_price_incl_tax),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let stock_row = match initial_stock {
            Some(quantity) => Some(
                stock::ActiveModel {
                    product_id: Set(created.id),
                    quantity: Set(quantity),
                    last_stocked_date: Set(Some(chrono::Utc::now())),
                    ..Default::default()
                }
                .insert(&txn)
                .await?,
            ),
            None => None,
        };

        txn.commit().await?;
        Ok((created, stock_row))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<ProductModel>, DbErr> {
        Product::find_by_id(id).one(self.get_db()).await
    }

    pub async fn find_all(&self) -> Result<Vec<ProductModel>, DbErr> {
        Product::find()
            .order_by_asc(product::Column::Id)
            .all(self.get_db())
            .await
    }
}

impl Repository for ProductRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
