//! # Progressive Loading
//!
//! Non-blocking scene loading without coroutines: `load_async` reads the
//! header and root-level components synchronously, then stores a cursor.
//! Each subsequent `update` call reads root-level child nodes one at a
//! time until either everything is read or the wall-clock slice for this
//! frame is spent. The slice is derived from the minimum frame rate the
//! loader must preserve and is deliberately not caller-configurable.
//!
//! Cancellation (`stop_async_loading`) and mid-stream failures leave the
//! partially populated graph in place; callers that need atomic loads
//! checkpoint externally.

use std::time::Instant;

use crate::error::{SceneError, SceneResult};
use crate::events::SceneEvent;
use crate::io;
use crate::io::doc::NodeDoc;
use crate::io::stream::StreamReader;
use crate::scene::resolver::SceneResolver;
use crate::scene::Scene;

/// Minimum frame rate the progressive loader keeps serviceable.
const ASYNC_LOAD_MIN_FPS: u32 = 30;
/// Wall-clock budget per `update` call, in milliseconds.
const ASYNC_LOAD_MAX_MILLIS: u128 = (1000 / ASYNC_LOAD_MIN_FPS) as u128;

/// Where the next root-level child comes from.
pub(crate) enum AsyncSource {
    /// Resumable position in a binary stream.
    Binary {
        /// The full stream.
        data: Vec<u8>,
        /// Byte offset of the next child record.
        cursor: usize,
    },
    /// Pre-parsed document children consumed in order.
    Document {
        /// Root-level child documents.
        children: Vec<NodeDoc>,
        /// Index of the next child to instantiate.
        next: usize,
    },
}

/// State of one in-flight progressive load.
pub(crate) struct AsyncProgress {
    pub(crate) source: AsyncSource,
    pub(crate) resolver: SceneResolver,
    pub(crate) loaded: u32,
    pub(crate) total: u32,
    pub(crate) checksum: u32,
    pub(crate) origin: Option<String>,
}

impl Scene {
    /// Begins a progressive load from a binary stream.
    ///
    /// The header and root-level components are read before returning;
    /// child nodes stream in across subsequent `update` calls. Any load
    /// already in flight is stopped first.
    ///
    /// # Errors
    ///
    /// The binary-load error set, for failures in the synchronous prefix.
    /// Failures inside the streamed part surface on a later `update` tick
    /// instead.
    pub fn load_async(&mut self, data: Vec<u8>, origin: Option<&str>) -> SceneResult<()> {
        self.stop_async_loading();
        tracing::info!(
            "async-loading scene from {}",
            origin.unwrap_or("<memory>")
        );

        let mut resolver = SceneResolver::new();
        let (total, cursor, sum) = {
            let mut reader = StreamReader::new(&data);
            io::binary::read_format_tag(&mut reader)?;
            self.clear();

            let root = self.root();
            let old_root_id = reader.read_u32()?;
            resolver.add_node(old_root_id, root);
            io::binary::read_node_body(self, &mut resolver, &mut reader, root, None)?;

            let total = reader.read_vle()?;
            (total, reader.position(), io::binary::checksum(&data))
        };

        self.async_state = Some(AsyncProgress {
            source: AsyncSource::Binary { data, cursor },
            resolver,
            loaded: 0,
            total,
            checksum: sum,
            origin: origin.map(str::to_owned),
        });
        Ok(())
    }

    /// Begins a progressive load from a structured-text document.
    ///
    /// The document is parsed and the root body applied synchronously;
    /// root-level children instantiate across subsequent `update` calls.
    ///
    /// # Errors
    ///
    /// The document-load error set, for failures in the synchronous
    /// prefix.
    pub fn load_async_text(&mut self, text: &str, origin: Option<&str>) -> SceneResult<()> {
        self.stop_async_loading();
        tracing::info!(
            "async-loading scene document from {}",
            origin.unwrap_or("<memory>")
        );

        let doc = io::text::parse_doc(text)?;
        self.clear();

        let mut resolver = SceneResolver::new();
        let root = self.root();
        let root_doc = doc.root;
        resolver.add_node(root_doc.id, root);
        io::text::apply_node_body(self, &mut resolver, root, &root_doc, None)?;

        let children = root_doc.children;
        let total = children.len() as u32;
        self.async_state = Some(AsyncProgress {
            source: AsyncSource::Document { children, next: 0 },
            resolver,
            loaded: 0,
            total,
            checksum: io::binary::checksum(text.as_bytes()),
            origin: origin.map(str::to_owned),
        });
        Ok(())
    }

    /// Cancels any in-flight progressive load, dropping the cursor and the
    /// resolver. The partially populated graph is left as is.
    pub fn stop_async_loading(&mut self) {
        self.async_state = None;
    }

    /// True while a progressive load is in flight.
    #[must_use]
    pub fn is_async_loading(&self) -> bool {
        self.async_state.is_some()
    }

    /// Fraction of root-level children loaded, in `[0, 1]`. Returns 1.0
    /// when idle or when the stream had no children.
    #[must_use]
    pub fn async_progress(&self) -> f32 {
        match &self.async_state {
            Some(progress) if progress.total > 0 => {
                progress.loaded as f32 / progress.total as f32
            }
            _ => 1.0,
        }
    }

    /// Root-level children loaded so far; 0 when idle.
    #[must_use]
    pub fn async_loaded_nodes(&self) -> u32 {
        self.async_state.as_ref().map_or(0, |p| p.loaded)
    }

    /// Total root-level children in the in-flight stream; 0 when idle.
    #[must_use]
    pub fn async_total_nodes(&self) -> u32 {
        self.async_state.as_ref().map_or(0, |p| p.total)
    }

    /// One frame's worth of progressive loading.
    pub(crate) fn update_async_loading(&mut self) {
        let Some(mut progress) = self.async_state.take() else {
            return;
        };
        let start = Instant::now();

        loop {
            if progress.loaded >= progress.total {
                self.finish_async_loading(progress);
                return;
            }

            let root = self.root();
            let result = match &mut progress.source {
                AsyncSource::Binary { data, cursor } => {
                    let mut reader = StreamReader::at(data, *cursor);
                    let read = io::binary::read_node_record(
                        self,
                        &mut progress.resolver,
                        &mut reader,
                        root,
                        None,
                    )
                    .map(|_| ());
                    *cursor = reader.position();
                    read
                }
                AsyncSource::Document { children, next } => {
                    let read = match children.get(*next) {
                        Some(child) => io::text::apply_node_doc(
                            self,
                            &mut progress.resolver,
                            root,
                            child,
                            None,
                        )
                        .map(|_| ()),
                        None => Err(SceneError::Document(
                            "document child index out of range".into(),
                        )),
                    };
                    *next += 1;
                    read
                }
            };

            if let Err(error) = result {
                // The failing read happened inside the progressive loop,
                // so the caller learns about it on this tick, not at
                // load_async time. The partial graph stays.
                tracing::error!("async scene load failed: {error}");
                self.emit(&SceneEvent::AsyncLoadFinished { success: false });
                return;
            }
            progress.loaded += 1;

            if start.elapsed().as_millis() >= ASYNC_LOAD_MAX_MILLIS {
                break;
            }
        }

        self.emit(&SceneEvent::AsyncLoadProgress {
            loaded: progress.loaded,
            total: progress.total,
        });
        self.async_state = Some(progress);
    }

    fn finish_async_loading(&mut self, progress: AsyncProgress) {
        let AsyncProgress {
            resolver,
            checksum,
            origin,
            ..
        } = progress;
        self.finish_load(resolver, checksum, origin.as_deref());
        tracing::info!("async scene load finished");
        self.emit(&SceneEvent::AsyncLoadFinished { success: true });
    }
}
