use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};

use crate::error::ServeError;
use crate::plan::BodyPlan;
use crate::stream::WindowStream;

/// Content type used when nothing better is known about a resource.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// What the server knows about a resource for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub id: String,
    pub size: u64,
    pub content_type: String,
}

impl ResourceDescriptor {
    /// Replaces the content type, e.g. with a type fixed by the endpoint.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Seekable reader handed out by a [`ResourceStore`].
pub trait ResourceReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ResourceReader for T {}

pub type BoxedReader = Box<dyn ResourceReader>;

/// Read-only access to the resources a server delivers.
///
/// Every method is asynchronous so that existence checks, size lookups and
/// reads never block the runtime.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Looks the resource up. `Ok(None)` means it does not exist.
    async fn describe(&self, id: &str) -> Result<Option<ResourceDescriptor>, ServeError>;

    /// Opens a reader positioned at the start of the resource.
    async fn open(&self, id: &str) -> Result<BoxedReader, ServeError>;

    /// Opens a bounded stream over the part of the resource selected by `plan`.
    ///
    /// `size` must be the size from [`ResourceStore::describe`] for the same
    /// request.
    async fn open_window(
        &self,
        id: &str,
        size: u64,
        plan: BodyPlan,
    ) -> Result<WindowStream<BoxedReader>, ServeError> {
        let reader = self.open(id).await?;
        Ok(match plan {
            BodyPlan::Full => WindowStream::new(reader, 0, size),
            BodyPlan::Window(window) => WindowStream::new(reader, window.start(), window.len()),
            BodyPlan::Empty => WindowStream::new(reader, 0, 0),
        })
    }

    /// Reads the whole resource into memory.
    async fn read_all(&self, id: &str) -> Result<Bytes, ServeError> {
        let mut reader = self.open(id).await?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

/// Serves files below a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an id onto a path below the root, refusing anything that could
    /// leave it.
    fn resolve(&self, id: &str) -> Result<PathBuf, ServeError> {
        let relative = Path::new(id);
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(ServeError::InvalidId(id.to_string())),
            }
        }
        if path == self.root {
            return Err(ServeError::InvalidId(id.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl ResourceStore for FsStore {
    async fn describe(&self, id: &str) -> Result<Option<ResourceDescriptor>, ServeError> {
        let path = self.resolve(id)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        let content_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string();

        Ok(Some(ResourceDescriptor {
            id: id.to_string(),
            size: metadata.len(),
            content_type,
        }))
    }

    async fn open(&self, id: &str) -> Result<BoxedReader, ServeError> {
        let path = self.resolve(id)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ServeError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory resources, mostly useful for tests and embedded assets.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    resources: HashMap<String, (Bytes, Option<String>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource whose content type is guessed from `id`.
    pub fn insert(&mut self, id: impl Into<String>, data: impl Into<Bytes>) -> &mut Self {
        self.resources.insert(id.into(), (data.into(), None));
        self
    }

    pub fn insert_typed(
        &mut self,
        id: impl Into<String>,
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> &mut Self {
        self.resources.insert(id.into(), (data.into(), Some(content_type.into())));
        self
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn describe(&self, id: &str) -> Result<Option<ResourceDescriptor>, ServeError> {
        Ok(self.resources.get(id).map(|(data, content_type)| {
            let content_type = content_type.clone().unwrap_or_else(|| {
                mime_guess::from_path(id).first_raw().unwrap_or(OCTET_STREAM).to_string()
            });
            ResourceDescriptor {
                id: id.to_string(),
                size: data.len() as u64,
                content_type,
            }
        }))
    }

    async fn open(&self, id: &str) -> Result<BoxedReader, ServeError> {
        let (data, _) = self
            .resources
            .get(id)
            .ok_or_else(|| ServeError::NotFound(id.to_string()))?;
        Ok(Box::new(io::Cursor::new(data.clone())))
    }

    async fn read_all(&self, id: &str) -> Result<Bytes, ServeError> {
        self.resources
            .get(id)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ServeError::NotFound(id.to_string()))
    }
}
