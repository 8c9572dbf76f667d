//! Catalog Manager: product CRUD, image upload, search, live list.
//!
//! Input is validated before anything touches the stores. All writes go
//! through the policy-enforcing [`DocumentStore`] with the caller's token,
//! so a non-admin is refused by the store no matter what the views show.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use right_water_core::authz::Collection;
use right_water_core::records::{
    DraftMode, Product, ProductData, ProductDraft, ValidationError, ensure_image,
};
use right_water_core::types::IdToken;

use crate::services::blob::{BlobError, BlobPath, BlobStore, UploadProgress};
use crate::store::{Document, DocumentStore, Query, StoreError, to_body};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("image upload failed: {0}")]
    Blob(#[from] BlobError),
}

/// An image file submitted with a product form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Product catalog operations.
#[derive(Clone)]
pub struct CatalogManager {
    store: DocumentStore,
    blobs: Arc<dyn BlobStore>,
}

impl CatalogManager {
    #[must_use]
    pub fn new(store: DocumentStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    fn products_by_name() -> Query {
        Query::collection(Collection::Products).order_by("name")
    }

    /// All products ordered by name, narrowed by `search` if given.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn list(
        &self,
        token: Option<&IdToken>,
        search: Option<&str>,
    ) -> Result<Vec<Product>, CatalogError> {
        let documents = self.store.list(token, &Self::products_by_name()).await?;
        let products = decode_products(&documents)?;
        Ok(match search {
            Some(term) => filter_products(&products, term),
            None => products,
        })
    }

    /// # Errors
    ///
    /// Store errors.
    pub async fn get(
        &self,
        token: Option<&IdToken>,
        id: &str,
    ) -> Result<Option<Product>, CatalogError> {
        let Some(document) = self.store.get(token, Collection::Products, id).await? else {
            return Ok(None);
        };
        Ok(Some(decode_product(&document)?))
    }

    /// Add a product. An image is required.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Validation`] before any store call, then store or
    /// upload errors.
    pub async fn create(
        &self,
        token: Option<&IdToken>,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
        progress: &UploadProgress,
    ) -> Result<Product, CatalogError> {
        let mut data = draft.validate(DraftMode::Add, image.is_some())?;
        let image = image.ok_or(ValidationError::ImageRequired)?;
        ensure_image(&image.content_type)?;

        data.image = Some(self.upload_image(token, image, progress).await?);
        let document = self
            .store
            .create(token, Collection::Products, None, to_body(&data)?)
            .await?;

        tracing::info!(product_id = %document.id, name = %data.name, "product created");
        Ok(decode_product(&document)?)
    }

    /// Edit a product. Without a new image the stored one is kept.
    ///
    /// # Errors
    ///
    /// As for [`Self::create`]; [`StoreError::NotFound`] for a missing product.
    pub async fn update(
        &self,
        token: Option<&IdToken>,
        id: &str,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
        progress: &UploadProgress,
    ) -> Result<Product, CatalogError> {
        let mut data = draft.validate(DraftMode::Edit, image.is_some())?;
        if let Some(image) = &image {
            ensure_image(&image.content_type)?;
        }

        if let Some(image) = image {
            data.image = Some(self.upload_image(token, image, progress).await?);
        }
        let document = self
            .store
            .update(token, Collection::Products, id, edit_patch(&data)?)
            .await?;

        tracing::info!(product_id = %id, "product updated");
        Ok(decode_product(&document)?)
    }

    /// # Errors
    ///
    /// Store errors.
    pub async fn delete(&self, token: Option<&IdToken>, id: &str) -> Result<(), CatalogError> {
        self.store.delete(token, Collection::Products, id).await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Live product list: a full snapshot, ordered by name, after every
    /// change to the catalog.
    ///
    /// # Errors
    ///
    /// Store errors for the initial read.
    pub async fn live(
        &self,
        token: Option<&IdToken>,
    ) -> Result<BoxStream<'static, Result<Vec<Product>, CatalogError>>, CatalogError> {
        let watch = self.store.watch(token, Self::products_by_name()).await?;
        Ok(watch
            .into_stream()
            .map(|snapshot| {
                let documents = snapshot?;
                Ok(decode_products(&documents)?)
            })
            .boxed())
    }

    async fn upload_image(
        &self,
        token: Option<&IdToken>,
        image: ImageUpload,
        progress: &UploadProgress,
    ) -> Result<String, CatalogError> {
        // Product images are writable by the same callers as products.
        let caller = self.store.caller(token).await?;
        if !caller.is_admin() {
            tracing::info!(uid = ?caller.uid(), "image upload denied");
            return Err(StoreError::PermissionDenied.into());
        }

        let path = BlobPath::for_upload(Collection::Products, &image.file_name, Utc::now());
        let result = self
            .blobs
            .put(&path, &image.content_type, &image.bytes, progress)
            .await;
        progress.clear();
        Ok(result?)
    }
}

/// Products whose name or category contains `term`, case-insensitively.
#[must_use]
pub fn filter_products(products: &[Product], term: &str) -> Vec<Product> {
    products.iter().filter(|p| p.matches(term)).cloned().collect()
}

fn decode_product(document: &Document) -> Result<Product, StoreError> {
    Ok(Product {
        id: document.id.as_str().into(),
        data: document.decode::<ProductData>()?,
    })
}

fn decode_products(documents: &[Document]) -> Result<Vec<Product>, StoreError> {
    documents.iter().map(decode_product).collect()
}

/// Patch for an edit: cleared optional fields are removed explicitly, and
/// the image is only touched when a new one was uploaded.
fn edit_patch(data: &ProductData) -> Result<Value, StoreError> {
    let mut patch = to_body(data)?;
    if let Value::Object(fields) = &mut patch {
        if data.category.is_none() {
            fields.insert("category".to_owned(), Value::Null);
        }
        if data.original_price.is_none() {
            fields.insert("originalPrice".to_owned(), Value::Null);
        }
    }
    Ok(patch)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use right_water_core::types::Uid;

    use super::*;
    use crate::services::blob::MemoryBlobStore;
    use crate::store::{DocumentBackend, MemoryBackend, TokenVerifier};

    struct PrefixVerifier;

    #[async_trait]
    impl TokenVerifier for PrefixVerifier {
        async fn verify(&self, token: &IdToken) -> Option<Uid> {
            token.expose().strip_prefix("token-").map(Uid::new)
        }
    }

    fn token(uid: &str) -> IdToken {
        IdToken::new(format!("token-{uid}"))
    }

    async fn catalog() -> (CatalogManager, Arc<MemoryBlobStore>) {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .insert(Collection::Admins, "boss", serde_json::json!({}))
            .await
            .unwrap();
        let store = DocumentStore::new(backend, Arc::new(PrefixVerifier));
        let blobs = Arc::new(MemoryBlobStore::new());
        (CatalogManager::new(store, blobs.clone()), blobs)
    }

    fn draft(name: &str, category: &str) -> ProductDraft {
        ProductDraft {
            name: name.to_owned(),
            category: category.to_owned(),
            price: Decimal::new(1250, 2),
            original_price: None,
            stock: 4,
            description: "Fresh".to_owned(),
        }
    }

    fn png() -> ImageUpload {
        ImageUpload {
            file_name: "bottle.png".to_owned(),
            content_type: "image/png".to_owned(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn admin_creates_product_with_image() {
        let (catalog, blobs) = catalog().await;
        let progress = UploadProgress::new();
        let product = catalog
            .create(Some(&token("boss")), &draft("Still Water", "Water"), Some(png()), &progress)
            .await
            .unwrap();

        let image = product.data.image.unwrap();
        assert!(image.starts_with("memory://products/"));
        assert!(image.ends_with("_bottle.png"));
        assert_eq!(blobs.len().await, 1);
        assert_eq!(progress.current(), None);
    }

    #[tokio::test]
    async fn create_requires_image_before_touching_stores() {
        let (catalog, blobs) = catalog().await;
        let err = catalog
            .create(Some(&token("boss")), &draft("Still Water", ""), None, &UploadProgress::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(ValidationError::ImageRequired)));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let (catalog, blobs) = catalog().await;
        let pdf = ImageUpload {
            content_type: "application/pdf".to_owned(),
            ..png()
        };
        let err = catalog
            .create(Some(&token("boss")), &draft("Still Water", ""), Some(pdf), &UploadProgress::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(ValidationError::NotAnImage(_))));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn customer_cannot_upload_or_create() {
        let (catalog, blobs) = catalog().await;
        let err = catalog
            .create(Some(&token("ana")), &draft("Still Water", ""), Some(png()), &UploadProgress::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Store(StoreError::PermissionDenied)));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn edit_keeps_image_and_clears_category() {
        let (catalog, _) = catalog().await;
        let admin = token("boss");
        let progress = UploadProgress::new();
        let created = catalog
            .create(Some(&admin), &draft("Still Water", "Water"), Some(png()), &progress)
            .await
            .unwrap();

        let mut edit = draft("Sparkling Water", "");
        edit.original_price = Some(Decimal::new(1500, 2));
        let updated = catalog
            .update(Some(&admin), created.id.as_str(), &edit, None, &progress)
            .await
            .unwrap();

        assert_eq!(updated.data.name, "Sparkling Water");
        assert_eq!(updated.data.category, None);
        assert_eq!(updated.data.image, created.data.image);
        assert!(updated.data.original_price.is_some());
    }

    #[tokio::test]
    async fn list_is_public_sorted_and_searchable() {
        let (catalog, _) = catalog().await;
        let admin = token("boss");
        let progress = UploadProgress::new();
        for (name, category) in [("Zest Tonic", "Mixers"), ("Alpine Spring", "Water"), ("Mint", "Herbal")] {
            catalog
                .create(Some(&admin), &draft(name, category), Some(png()), &progress)
                .await
                .unwrap();
        }

        let all = catalog.list(None, None).await.unwrap();
        let names: Vec<_> = all.iter().map(|p| p.data.name.as_str()).collect();
        assert_eq!(names, ["Alpine Spring", "Mint", "Zest Tonic"]);

        let water = catalog.list(None, Some("WATER")).await.unwrap();
        assert_eq!(water.len(), 1);
        assert_eq!(water[0].data.name, "Alpine Spring");
    }

    #[tokio::test]
    async fn customer_cannot_delete() {
        let (catalog, _) = catalog().await;
        let created = catalog
            .create(Some(&token("boss")), &draft("Still Water", ""), Some(png()), &UploadProgress::new())
            .await
            .unwrap();
        let err = catalog
            .delete(Some(&token("ana")), created.id.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Store(StoreError::PermissionDenied)));
        catalog
            .delete(Some(&token("boss")), created.id.as_str())
            .await
            .unwrap();
        assert!(catalog.get(None, created.id.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_list_emits_full_snapshots() {
        let (catalog, _) = catalog().await;
        let mut feed = catalog.live(None).await.unwrap();
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        catalog
            .create(Some(&token("boss")), &draft("Still Water", ""), Some(png()), &UploadProgress::new())
            .await
            .unwrap();
        let snapshot = feed.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn live_list_outlives_the_manager_and_token() {
        let feed = {
            let (catalog, _) = catalog().await;
            let token = token("boss");
            catalog.live(Some(&token)).await.unwrap()
        };
        let first = tokio::spawn(async move {
            let mut feed = feed;
            feed.next().await
        })
        .await
        .unwrap();
        assert!(first.unwrap().unwrap().is_empty());
    }
}
