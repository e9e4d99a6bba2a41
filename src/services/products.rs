use crate::{
    entities::{product::Model as ProductModel, stock::Model as StockModel},
    errors::ServiceError,
    repositories::{NewProduct, ProductRepository},
    services::orders::validate_unit_price,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

/// Request to add a product to the catalog
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    #[schema(example = "Ceramic mug")]
    pub name: String,
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_unit_price")]
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 12.5)]
    pub unit_price_excl_tax: Decimal,
    #[validate(custom = "validate_unit_price")]
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 15.0)]
    pub unit_price_incl_tax: Decimal,
    /// Creates the stock row with this quantity when present
    #[validate(range(min = 0, message = "must not be negative"))]
    #[schema(example = 25)]
    pub initial_stock: Option<i32>,
}

#[derive(Clone)]
pub struct ProductService {
    products: ProductRepository,
}

impl ProductService {
    pub fn new(products: ProductRepository) -> Self {
        Self { products }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<(ProductModel, Option<StockModel>), ServiceError> {
        request.validate()?;

        let initial_stock = request.initial_stock;
        let (product, stock) = self
            .products
            .create(
                NewProduct {
                    name: request.name.trim().to_string(),
                    description: request.description,
                    unit_price_excl_tax: request.unit_price_excl_tax,
                    unit_price_incl_tax: request.unit_price_incl_tax,
                },
                initial_stock,
            )
            .await
            .map_err(|e| ServiceError::write_failed("create product", e))?;

        info!(product_id = product.id, initial_stock = ?initial_stock, "Product created");
        Ok((product, stock))
    }

    pub async fn get_product(&self, id: i64) -> Result<ProductModel, ServiceError> {
        self.products
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(self.products.find_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> CreateProductRequest {
        CreateProductRequest {
            name: "Ceramic mug".into(),
            description: None,
            unit_price_excl_tax: dec!(12.5),
            unit_price_incl_tax: dec!(15),
            initial_stock: Some(3),
        }
    }

    #[test]
    fn well_formed_request_validates() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn invalid_fields_become_validation_details() {
        let mut req = request();
        req.name = String::new();
        req.initial_stock = Some(-4);

        let err: ServiceError = req.validate().unwrap_err().into();
        assert_eq!(
            err.details().unwrap(),
            vec![
                "initial_stock: must not be negative".to_string(),
                "name: must be between 1 and 255 characters".to_string(),
            ]
        );
    }
}
