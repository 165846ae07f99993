use std::{env, sync::Arc};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder,
    parse_url,
    path::Path,
    Attribute,
    AttributeValue,
    Attributes,
    ObjectStore,
    PutOptions,
    PutPayload,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// Content type reported for objects whose backend does not persist
/// attributes (e.g. the local filesystem). Every object this service
/// writes is labeled `image/png`, so reads stay uniform across backends.
pub const FALLBACK_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageStoreConfig {
    /// Object store URL for non-S3 backends, e.g. `file:///var/lib/pixelbin`
    /// or `memory:///`.
    pub path: Option<String>,
    pub s3: Option<S3Config>,
}

impl ImageStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.is_some() && self.s3.is_some() {
            return Err(anyhow!("cannot specify both path and s3 image storage"));
        }
        if self.path.is_none() && self.s3.is_none() {
            return Err(anyhow!("must specify one of path or s3 image storage"));
        }
        if self.s3.is_some() {
            for var in ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"] {
                if env::var(var).is_err() {
                    return Err(anyhow!("{} must be set for s3 image storage", var));
                }
            }
        }
        Ok(())
    }
}

/// An object fetched from the backing store. The store is the sole owner
/// of object lifetime; this is a fully buffered copy plus the metadata
/// the store reported for it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content: Bytes,
    pub content_type: String,
    pub etag: Option<String>,
}

#[derive(Clone)]
pub struct ImageStore {
    object_store: Arc<dyn ObjectStore>,
    prefix: Path,
}

impl ImageStore {
    pub fn new(config: &ImageStoreConfig) -> Result<Self> {
        config.validate()?;
        if let Some(s3) = &config.s3 {
            let mut builder = AmazonS3Builder::from_env()
                .with_region(&s3.region)
                .with_bucket_name(&s3.bucket)
                .with_endpoint(&s3.endpoint_url);
            // For supporting localstack/minio for testing
            if s3.endpoint_url.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
            info!("using s3 image store bucket: {}", s3.bucket);
            return Ok(Self {
                object_store: Arc::new(builder.build()?),
                prefix: Path::default(),
            });
        }
        let url_str = config.path.as_deref().unwrap_or_default();
        let url = url_str.parse::<Url>()?;
        let (object_store, prefix) = parse_url(&url)?;
        info!("using image store path: {}", url_str);
        Ok(Self {
            object_store: Arc::from(object_store),
            prefix,
        })
    }

    fn object_path(&self, key: &str) -> Path {
        if self.prefix.as_ref().is_empty() {
            Path::from(key)
        } else {
            Path::from(format!("{}/{}", self.prefix, key))
        }
    }

    /// Fetch an object by key, fully buffered. Returns `None` when the
    /// store has no object under the key.
    pub async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let path = self.object_path(key);
        let result = match self.object_store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(anyhow!("can't get object {:?}: {:?}", key, e)),
        };
        let etag = result.meta.e_tag.clone();
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| v.as_ref().to_string())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let content = result
            .bytes()
            .await
            .map_err(|e| anyhow!("error reading object {:?}: {:?}", key, e))?;
        Ok(Some(StoredObject {
            content,
            content_type,
            etag,
        }))
    }

    /// Store an object under the key, unconditionally overwriting any
    /// existing object with the same key.
    pub async fn put(&self, key: &str, content: Bytes, content_type: &str) -> Result<()> {
        let path = self.object_path(key);
        let payload = PutPayload::from(content);
        let opts = PutOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            )]),
            ..Default::default()
        };
        match self.object_store.put_opts(&path, payload.clone(), opts).await {
            Ok(_) => Ok(()),
            // LocalFileSystem rejects attribute writes; store the bytes bare
            // and let readers use the fallback content type.
            Err(object_store::Error::NotImplemented) => {
                self.object_store
                    .put(&path, payload)
                    .await
                    .map_err(|e| anyhow!("can't put object {:?}: {:?}", key, e))?;
                Ok(())
            }
            Err(e) => Err(anyhow!("can't put object {:?}: {:?}", key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> ImageStore {
        ImageStore::new(&ImageStoreConfig {
            path: Some("memory:///".to_string()),
            s3: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trip() {
        let store = memory_store();
        store
            .put("abcd.png", Bytes::from_static(b"image bytes"), "image/png")
            .await
            .unwrap();

        let object = store.get("abcd.png").await.unwrap().unwrap();
        assert_eq!(object.content.as_ref(), b"image bytes");
        assert_eq!(object.content_type, "image/png");
        assert!(object.etag.is_some());
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let store = memory_store();
        assert!(store.get("never-written.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_same_key_succeeds() {
        let store = memory_store();
        store
            .put("key.png", Bytes::from_static(b"first"), "image/png")
            .await
            .unwrap();
        store
            .put("key.png", Bytes::from_static(b"second"), "image/png")
            .await
            .unwrap();

        let object = store.get("key.png").await.unwrap().unwrap();
        assert_eq!(object.content.as_ref(), b"second");
    }

    #[tokio::test]
    async fn local_filesystem_backend_falls_back_on_content_type() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(&ImageStoreConfig {
            path: Some(format!("file://{}", temp_dir.path().display())),
            s3: None,
        })
        .unwrap();

        store
            .put("abcd.png", Bytes::from_static(b"image bytes"), "image/png")
            .await
            .unwrap();

        let object = store.get("abcd.png").await.unwrap().unwrap();
        assert_eq!(object.content.as_ref(), b"image bytes");
        assert_eq!(object.content_type, FALLBACK_CONTENT_TYPE);
        assert!(object.etag.is_some());
    }

    #[test]
    fn validate_requires_exactly_one_backend() {
        let neither = ImageStoreConfig {
            path: None,
            s3: None,
        };
        assert!(neither.validate().is_err());

        let both = ImageStoreConfig {
            path: Some("memory:///".to_string()),
            s3: Some(S3Config {
                bucket: "images".to_string(),
                region: "us-east-1".to_string(),
                endpoint_url: "http://localhost:9000".to_string(),
            }),
        };
        assert!(both.validate().is_err());
    }
}
