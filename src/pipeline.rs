//! End-to-end subsetting.
//!
//! ## Plan
//!
//! ```text
//! OriginReference → OriginResolver → PartitionSelector → PartitionSource::fetch
//!     → SchemaNormalizer → traverse → trim_junction
//! ```
//!
//! Both [`SubsetPipeline::subset`] and [`SubsetPipeline::subset_into`] run the
//! same plan, then extract the requested layers concurrently. Extraction
//! tasks share the opened dataset through an `Arc` and are bounded by a
//! semaphore. Only the coordinating task touches the output, so writes are
//! serialized. If any task fails, the rest are aborted and awaited before the
//! error is returned, which releases the dataset on every exit path.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SubsetConfig;
use crate::layer::LayerExtractor;
use crate::manifest::{ManifestBuilder, SubsetManifest};
use crate::network::{NetworkIndex, Subnetwork};
use crate::partition::{PartitionError, PartitionSelector, RegionBoundaries};
use crate::resolver::{OriginResolver, ResolveError};
use crate::schema::{SchemaError, SchemaNormalizer};
use crate::store::{BoxError, FeatureLookup, LayerWriter, PartitionDataset, PartitionSource};
use crate::traversal::{traverse, JunctionConvention, TraversalError, TraversalResult};
use crate::types::{NodeId, OriginReference, PartitionKey, ResolvedOrigin, Table};

/// Error type for subset operations.
#[derive(Debug, thiserror::Error)]
pub enum SubsetError {
    /// Network or layer schema could not be read.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Origin could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// No partition holds the origin.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Network contains a cycle.
    #[error(transparent)]
    Traversal(#[from] TraversalError),
    /// Partition source failed.
    #[error("partition source failed")]
    Source(#[source] BoxError),
    /// Layer writer failed.
    #[error("layer writer failed")]
    Writer(#[source] BoxError),
    /// The partition does not carry a requested layer.
    #[error("layer `{layer}` not found in partition {partition}")]
    LayerNotFound {
        /// Layer name.
        layer: String,
        /// Partition key.
        partition: PartitionKey,
    },
    /// Configured junction pattern is not a valid regex.
    #[error("invalid junction pattern")]
    JunctionPattern(#[from] regex_lite::Error),
    /// An extraction task panicked or was aborted.
    #[error("extraction task failed")]
    Task(#[from] tokio::task::JoinError),
    /// Extraction was cancelled before it acquired a slot.
    #[error("extraction cancelled")]
    Cancelled,
}

impl SubsetError {
    /// Wrap a partition source error.
    pub fn from_source<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        Self::Source(Box::new(e))
    }

    /// Wrap a layer writer error.
    pub fn from_writer<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        Self::Writer(Box::new(e))
    }
}

/// Result of [`SubsetPipeline::subset`].
#[derive(Debug, Clone)]
pub struct Subset {
    /// Resolved origin, with every selected partition attached.
    pub origin: ResolvedOrigin,
    /// Partition the subset was cut from.
    pub partition: PartitionKey,
    /// Trimmed traversal result.
    pub traversal: TraversalResult,
    /// Extracted layers, in caller order.
    pub layers: Vec<(String, Table)>,
    /// Manifest describing the subset.
    pub manifest: SubsetManifest,
}

impl Subset {
    /// Extracted table for `name`.
    pub fn layer(&self, name: &str) -> Option<&Table> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// Shared plan of one operation. Holds the only long-lived dataset handle.
struct Plan<D> {
    origin: ResolvedOrigin,
    partition: PartitionKey,
    dataset: Arc<D>,
    traversal: TraversalResult,
}

/// Receives extracted layers in completion order.
#[async_trait]
trait LayerSink: Send {
    async fn accept(&mut self, slot: usize, name: &str, table: Table) -> Result<(), SubsetError>;
}

struct Collect {
    tables: Vec<Option<Table>>,
}

#[async_trait]
impl LayerSink for Collect {
    async fn accept(&mut self, slot: usize, _name: &str, table: Table) -> Result<(), SubsetError> {
        self.tables[slot] = Some(table);
        Ok(())
    }
}

struct Forward<'w, W> {
    writer: &'w mut W,
}

#[async_trait]
impl<'w, W: LayerWriter> LayerSink for Forward<'w, W> {
    async fn accept(&mut self, _slot: usize, name: &str, table: Table) -> Result<(), SubsetError> {
        self.writer
            .write_layer(name, &table)
            .await
            .map_err(SubsetError::from_writer)
    }
}

/// End-to-end subsetting over a partition source and a feature lookup.
pub struct SubsetPipeline<S: PartitionSource, L: FeatureLookup> {
    source: Arc<S>,
    lookup: Arc<L>,
    index: Option<Arc<NetworkIndex>>,
    boundaries: Arc<RegionBoundaries>,
    config: SubsetConfig,
    junction: JunctionConvention,
    extractor: LayerExtractor,
}

impl<S: PartitionSource, L: FeatureLookup> SubsetPipeline<S, L> {
    /// Create a pipeline. Fails if the configured junction pattern is invalid.
    pub fn new(source: Arc<S>, lookup: Arc<L>, config: SubsetConfig) -> Result<Self, SubsetError> {
        let junction = config.junction()?;
        Ok(Self {
            source,
            lookup,
            index: None,
            boundaries: Arc::new(RegionBoundaries::default()),
            config,
            junction,
            extractor: LayerExtractor::new(),
        })
    }

    /// Resolve origins and select partitions against a national index.
    pub fn with_index(mut self, index: Arc<NetworkIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Regional boundaries for spatial partition selection.
    pub fn with_boundaries(mut self, boundaries: RegionBoundaries) -> Self {
        self.boundaries = Arc::new(boundaries);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SubsetConfig {
        &self.config
    }

    /// Extract `layers` for the basin upstream of `reference`.
    ///
    /// An empty layer list extracts the configured default layers. Tables are
    /// returned in the order requested, duplicates removed.
    pub async fn subset<I, N>(&self, reference: &OriginReference, layers: I) -> Result<Subset, SubsetError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let layers = self.layer_names(layers);
        let span = info_span!("subset", run_id = %Uuid::new_v4(), origin = %reference);
        async move {
            let plan = self.plan(reference).await?;
            let mut collect = Collect { tables: vec![None; layers.len()] };
            let rows = self.extract_layers(&plan, &layers, &mut collect).await?;
            let manifest = build_manifest(reference, &plan, &layers, &rows);

            let Plan { origin, partition, traversal, .. } = plan;
            let layers: Vec<(String, Table)> = layers
                .into_iter()
                .zip(collect.tables)
                .filter_map(|(name, table)| table.map(|t| (name, t)))
                .collect();

            info!(subset_id = %manifest.subset_id, layers = layers.len(), "subset complete");
            Ok(Subset { origin, partition, traversal, layers, manifest })
        }
        .instrument(span)
        .await
    }

    /// Like [`SubsetPipeline::subset`], but hands each table to `writer` as
    /// soon as it is extracted and finishes the container with a manifest.
    ///
    /// The writer sees each layer exactly once, one call at a time.
    pub async fn subset_into<I, N, W>(
        &self,
        reference: &OriginReference,
        layers: I,
        writer: &mut W,
    ) -> Result<PathBuf, SubsetError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
        W: LayerWriter,
    {
        let layers = self.layer_names(layers);
        let span = info_span!("subset", run_id = %Uuid::new_v4(), origin = %reference);
        async move {
            let plan = self.plan(reference).await?;
            let rows = self
                .extract_layers(&plan, &layers, &mut Forward { writer: &mut *writer })
                .await?;
            let manifest = build_manifest(reference, &plan, &layers, &rows);
            drop(plan);

            let path = writer.finish(&manifest).await.map_err(SubsetError::from_writer)?;
            info!(subset_id = %manifest.subset_id, path = %path.display(), "subset written");
            Ok(path)
        }
        .instrument(span)
        .await
    }

    /// Requested names, deduplicated in order; the configured layers if none.
    fn layer_names<I, N>(&self, layers: I) -> Vec<String>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let requested = dedup_names(layers.into_iter().map(Into::into));
        if requested.is_empty() {
            dedup_names(self.config.layers.iter().cloned())
        } else {
            requested
        }
    }

    async fn plan(&self, reference: &OriginReference) -> Result<Plan<S::Dataset>, SubsetError> {
        let index = self.index.as_deref();

        let origin = OriginResolver::new(Arc::clone(&self.lookup))
            .resolve(reference, index)
            .await?;
        let keys = PartitionSelector::new(Arc::clone(&self.lookup), Arc::clone(&self.boundaries))
            .select(&origin, index)
            .await?;

        let (dataset, network) = self.open_partition(&origin.id, &keys).await?;
        let partition = dataset.key().clone();
        info!(partition = %partition, edges = network.len(), "partition opened");

        let traversal = traverse(&network, &origin.id)?.trim_junction(&self.junction);
        drop(network);
        info!(
            outlet = %traversal.outlet(),
            features = traversal.len(),
            fingerprint = %traversal.fingerprint(),
            "traversal complete"
        );

        Ok(Plan {
            origin: origin.with_partitions(keys),
            partition,
            dataset: Arc::new(dataset),
            traversal,
        })
    }

    /// Open the partition whose network holds `origin`.
    ///
    /// Keys are tried in ascending order. If none of several partitions
    /// touches the origin, the first is used.
    async fn open_partition(
        &self,
        origin: &NodeId,
        keys: &BTreeSet<PartitionKey>,
    ) -> Result<(S::Dataset, Subnetwork), SubsetError> {
        let mut fallback = None;
        for key in keys {
            let dataset = self.source.fetch(key).await.map_err(SubsetError::from_source)?;
            let network = self.read_network(&dataset).await?;
            if keys.len() == 1 || network.contains(origin) {
                return Ok((dataset, network));
            }
            if fallback.is_none() {
                fallback = Some((dataset, network));
            }
        }

        match fallback {
            Some(opened) => {
                warn!(id = %origin, partitions = ?keys, "origin not in any partition network, using first");
                Ok(opened)
            }
            None => Err(PartitionError::PartitionNotFound(origin.clone()).into()),
        }
    }

    async fn read_network(&self, dataset: &S::Dataset) -> Result<Subnetwork, SubsetError> {
        let name = &self.config.network_layer;
        let table = dataset
            .read_layer(name)
            .await
            .map_err(SubsetError::from_source)?
            .ok_or_else(|| SubsetError::LayerNotFound {
                layer: name.clone(),
                partition: dataset.key().clone(),
            })?;
        Ok(SchemaNormalizer::new().subnetwork(&table)?)
    }

    /// Extract every layer concurrently, feeding `sink` in completion order.
    ///
    /// Returns row counts by position in `layers`.
    async fn extract_layers<K: LayerSink>(
        &self,
        plan: &Plan<S::Dataset>,
        layers: &[String],
        sink: &mut K,
    ) -> Result<Vec<usize>, SubsetError> {
        let ids = Arc::new(plan.traversal.id_set());
        let semaphore = Arc::new(Semaphore::new(self.config.effective_concurrency()));
        let mut tasks: JoinSet<Result<(usize, Table), SubsetError>> = JoinSet::new();

        for (slot, name) in layers.iter().enumerate() {
            let dataset = Arc::clone(&plan.dataset);
            let ids = Arc::clone(&ids);
            let semaphore = Arc::clone(&semaphore);
            let name = name.clone();
            let default_crs = self.config.default_crs.clone();
            let extractor = self.extractor;

            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.map_err(|_| SubsetError::Cancelled)?;
                let table = dataset
                    .read_layer(&name)
                    .await
                    .map_err(SubsetError::from_source)?
                    .ok_or_else(|| SubsetError::LayerNotFound {
                        layer: name.clone(),
                        partition: dataset.key().clone(),
                    })?;
                let extracted = extractor.extract(&name, &table, &ids, default_crs.as_ref())?;
                Ok((slot, extracted))
            });
        }

        let mut rows = vec![0; layers.len()];
        while let Some(joined) = tasks.join_next().await {
            let accepted = match joined {
                Ok(Ok((slot, table))) => {
                    rows[slot] = table.len();
                    sink.accept(slot, &layers[slot], table).await
                }
                Ok(Err(e)) => Err(e),
                Err(e) => Err(SubsetError::Task(e)),
            };
            if let Err(e) = accepted {
                warn!(error = %e, "layer extraction failed, aborting remaining layers");
                tasks.shutdown().await;
                return Err(e);
            }
        }
        Ok(rows)
    }
}

fn build_manifest<D>(reference: &OriginReference, plan: &Plan<D>, layers: &[String], rows: &[usize]) -> SubsetManifest {
    let mut builder = ManifestBuilder::new(reference.clone(), plan.partition.clone(), &plan.traversal);
    for (name, &count) in layers.iter().zip(rows) {
        builder.layer(name.as_str(), count);
    }
    builder.build()
}

fn dedup_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    names.filter(|name| seen.insert(name.clone())).collect()
}
