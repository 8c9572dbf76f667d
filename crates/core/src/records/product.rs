//! Product records and the catalog form draft.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, PriceError, ProductId};

/// Errors for malformed product input, raised before any store call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("product name is required")]
    MissingName,
    #[error("invalid price: {0}")]
    Price(#[from] PriceError),
    #[error("invalid original price: {0}")]
    OriginalPrice(PriceError),
    #[error("stock cannot be negative")]
    NegativeStock,
    #[error("an image is required for a new product")]
    ImageRequired,
    #[error("file is not an image: {0}")]
    NotAnImage(String),
}

/// Body of a `products/{id}` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub price: Price,
    /// Pre-sale price shown struck through when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Price>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub description: String,
    /// Public URL of the product image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A product together with its document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(flatten)]
    pub data: ProductData,
}

impl Product {
    /// Whether the product matches a search term by name or category
    /// (case-insensitive). An empty term matches everything.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.data.name.to_lowercase().contains(&term)
            || self
                .data
                .category
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&term))
    }
}

/// Whether a draft is creating a product or editing an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Add,
    Edit,
}

/// Raw catalog form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub description: String,
}

impl ProductDraft {
    /// Validate the draft into a document body.
    ///
    /// `has_new_image` tells whether an image accompanies the draft; adding a
    /// product requires one, editing keeps the stored image when absent.
    /// `image` is left `None` for the caller to fill after upload.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(
        &self,
        mode: DraftMode,
        has_new_image: bool,
    ) -> Result<ProductData, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        let price = Price::positive(self.price)?;
        let original_price = self
            .original_price
            .filter(|p| !p.is_zero())
            .map(Price::positive)
            .transpose()
            .map_err(ValidationError::OriginalPrice)?;
        let stock = u32::try_from(self.stock).map_err(|_| ValidationError::NegativeStock)?;
        if mode == DraftMode::Add && !has_new_image {
            return Err(ValidationError::ImageRequired);
        }

        let category = Some(self.category.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_owned);

        Ok(ProductData {
            name: name.to_owned(),
            category,
            price,
            original_price,
            stock,
            description: self.description.trim().to_owned(),
            image: None,
        })
    }
}

/// Check that an upload's declared content type is an image.
///
/// # Errors
///
/// Returns [`ValidationError::NotAnImage`] otherwise.
pub fn ensure_image(content_type: &str) -> Result<(), ValidationError> {
    if content_type.starts_with("image/") {
        Ok(())
    } else {
        Err(ValidationError::NotAnImage(content_type.to_owned()))
    }
}
