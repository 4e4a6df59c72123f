use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

/// Accessor for original image bytes in S3-compatible object storage.
/// Uploading and thumbnailing are owned by the upload service; this side
/// only reads.
pub struct ImageStore {
    bucket: Box<Bucket>,
}

impl ImageStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    /// Storage key convention for original image bytes.
    pub fn key_for_image(image_id: Uuid) -> String {
        format!("images/{image_id}/original")
    }

    /// Download the original bytes for an image.
    pub async fn download(&self, image_id: Uuid) -> Result<Vec<u8>, StorageError> {
        let key = Self::key_for_image(image_id);
        let response = self.bucket.get_object(&key).await.map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
