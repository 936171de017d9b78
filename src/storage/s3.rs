// dbarchiver/src/storage/s3.rs
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, MetadataDirective, StorageClass,
};
use tracing::{debug, info, warn};

use super::{ObjectInfo, ObjectStore, StorageConnection, StorageTier};
use crate::errors::{BackupError, Result};

/// [`ObjectStore`] backed by an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: s3::Client,
    bucket: String,
    region: Option<String>,
}

impl S3ObjectStore {
    /// Builds a client from the storage connection string.
    pub async fn connect(connection_string: &str, bucket: &str) -> Result<Self> {
        let conn = StorageConnection::parse(connection_string)?;
        debug!("Storage connection: {:?}", conn);

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(endpoint) = &conn.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(region) = &conn.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some((access_key_id, secret_access_key)) = conn.static_credentials() {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                conn.session_token.clone(),
                None,     // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = s3::config::Builder::from(&sdk_config);
        if let Some(force_path_style) = conn.force_path_style {
            builder = builder.force_path_style(force_path_style);
        }

        Ok(Self {
            client: s3::Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            region: sdk_config.region().map(|r| r.as_ref().to_string()),
        })
    }

    fn location_constraint(&self) -> Option<CreateBucketConfiguration> {
        // us-east-1 is the implicit default and rejects an explicit constraint.
        self.region
            .as_deref()
            .filter(|region| *region != "us-east-1")
            .map(|region| {
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build()
            })
    }
}

pub fn storage_class(tier: StorageTier) -> StorageClass {
    match tier {
        StorageTier::Hot => StorageClass::Standard,
        StorageTier::Cool => StorageClass::StandardIa,
        StorageTier::Cold => StorageClass::Glacier,
        StorageTier::Archive => StorageClass::DeepArchive,
    }
}

fn to_utc(ts: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn container(&self) -> &str {
        &self.bucket
    }

    async fn ensure_container(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("Bucket {} already exists", self.bucket);
                return Ok(());
            }
            Err(e) => debug!(
                "HeadBucket on {} failed, creating it: {}",
                self.bucket,
                DisplayErrorContext(&e)
            ),
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if let Some(configuration) = self.location_constraint() {
            request = request.create_bucket_configuration(configuration);
        }

        match request.send().await {
            Ok(_) => {
                info!("Created bucket {}", self.bucket);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_bucket_already_owned_by_you() {
                    Ok(())
                } else {
                    Err(BackupError::remote(
                        "CreateBucket",
                        DisplayErrorContext(&service_error),
                    ))
                }
            }
        }
    }

    async fn upload_file(&self, name: &str, path: &Path) -> Result<u64> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| BackupError::io(format!("Failed to stat {}", path.display()), e))?
            .len();

        let body = ByteStream::from_path(path).await.map_err(|e| {
            BackupError::io(
                format!("Failed to create ByteStream from file: {}", path.display()),
                std::io::Error::other(e),
            )
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::remote("PutObject", DisplayErrorContext(&e)))?;

        Ok(size)
    }

    async fn set_tier(&self, name: &str, tier: StorageTier) -> Result<()> {
        // S3 changes the class of an existing object by copying it onto itself.
        // Backup names are plain ASCII, so the copy source needs no escaping.
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(name)
            .copy_source(format!("{}/{}", self.bucket, name))
            .storage_class(storage_class(tier))
            .metadata_directive(MetadataDirective::Copy)
            .send()
            .await
            .map_err(|e| BackupError::remote("CopyObject", DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|e| BackupError::remote("ListObjectsV2", DisplayErrorContext(&e)))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                match object.last_modified().and_then(to_utc) {
                    Some(last_modified) => objects.push(ObjectInfo {
                        name: key.to_string(),
                        last_modified,
                    }),
                    None => warn!("Skipping {} in listing: no usable last-modified time", key),
                }
            }
        }
        Ok(objects)
    }

    async fn delete_if_exists(&self, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| BackupError::remote("DeleteObject", DisplayErrorContext(&e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_tier_maps_to_deep_archive() {
        assert_eq!(storage_class(StorageTier::Archive), StorageClass::DeepArchive);
        assert_eq!(storage_class(StorageTier::Cold), StorageClass::Glacier);
        assert_eq!(storage_class(StorageTier::Cool), StorageClass::StandardIa);
        assert_eq!(storage_class(StorageTier::Hot), StorageClass::Standard);
    }

    #[test]
    fn test_to_utc_keeps_subsecond_precision() {
        let ts = s3::primitives::DateTime::from_secs_and_nanos(1_700_000_000, 500);
        let converted = to_utc(&ts).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
        assert_eq!(converted.timestamp_subsec_nanos(), 500);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_connection_string() {
        let result = S3ObjectStore::connect("NotAKey=1", "backups").await;
        assert!(matches!(result, Err(BackupError::Config(_))));
    }

    #[tokio::test]
    async fn test_location_constraint_skipped_for_us_east_1() -> anyhow::Result<()> {
        let store = S3ObjectStore::connect(
            "Region=us-east-1;AccessKeyId=a;SecretAccessKey=b",
            "backups",
        )
        .await?;
        assert!(store.location_constraint().is_none());

        let store = S3ObjectStore::connect(
            "Region=eu-central-1;AccessKeyId=a;SecretAccessKey=b",
            "backups",
        )
        .await?;
        let configuration = store.location_constraint().unwrap();
        assert_eq!(
            configuration.location_constraint(),
            Some(&BucketLocationConstraint::EuCentral1)
        );
        assert_eq!(store.container(), "backups");
        Ok(())
    }
}
