//! Extraction of a geographic region from a set of ground tracks.
//!
//! The [RegionExtractor] resolves, for every ground track, the range of reference segments
//! inside a bounding box and the range of photons those segments cover. It then copies exactly
//! those rows of every reference and per-photon dataset into the destination store. Each step
//! is issued as one [CollectionManager] call across all tracks.

use crate::array::ArrayData;
use crate::collection::CollectionManager;
use crate::error::SubsetError;
use crate::models::{AttrValue, BoundingBox, DatasetMeta, IndexRange, Selection};
use crate::range_finder::{find_range, photon_count_range};
use crate::store::{ArrayStore, NodeKind, NodePath};

use hashbrown::HashSet;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attribute holding the first segment of a track's range, or -1.
pub const INDEX_RANGE_MIN: &str = "index_range_min";
/// Attribute holding one past the last segment of a track's range, or -1.
pub const INDEX_RANGE_MAX: &str = "index_range_max";

/// Names of the ground tracks and datasets to extract.
///
/// Dataset paths are relative to a ground track group, except for scalar datasets which are
/// relative to the root.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackLayout {
    /// Ground track groups under the root
    pub ground_tracks: Vec<String>,
    /// Latitude of each reference segment
    pub latitude: String,
    /// Longitude of each reference segment
    pub longitude: String,
    /// Number of photons in each reference segment
    pub segment_counts: String,
    /// Datasets indexed by photon
    pub photon_datasets: Vec<String>,
    /// Datasets copied once, in full
    pub scalar_datasets: Vec<String>,
}

/// The six ATL03 ground tracks.
pub const ATL03_GROUND_TRACKS: [&str; 6] = ["gt1l", "gt1r", "gt2l", "gt2r", "gt3l", "gt3r"];

impl Default for TrackLayout {
    fn default() -> Self {
        TrackLayout {
            ground_tracks: strings(&ATL03_GROUND_TRACKS),
            latitude: "geolocation/reference_photon_lat".to_string(),
            longitude: "geolocation/reference_photon_lon".to_string(),
            segment_counts: "geolocation/segment_ph_cnt".to_string(),
            photon_datasets: strings(&[
                "heights/dist_ph_along",
                "heights/h_ph",
                "heights/signal_conf_ph",
                "heights/quality_ph",
                "heights/lat_ph",
                "heights/lon_ph",
                "heights/delta_time",
            ]),
            scalar_datasets: strings(&[
                "orbit_info/sc_orient",
                "ancillary_data/start_rgt",
                "ancillary_data/start_cycle",
            ]),
        }
    }
}

impl TrackLayout {
    /// The ATL03 layout restricted to some ground tracks.
    ///
    /// Repeated ground tracks are dropped, keeping the first occurrence.
    pub fn with_ground_tracks(ground_tracks: Vec<String>) -> Self {
        TrackLayout {
            ground_tracks: distinct(ground_tracks),
            ..Default::default()
        }
    }

    /// Datasets indexed by reference segment, latitude and longitude first.
    pub fn reference_datasets(&self) -> [&str; 3] {
        [
            self.latitude.as_str(),
            self.longitude.as_str(),
            self.segment_counts.as_str(),
        ]
    }

    /// Every dataset copied for a track, reference datasets first.
    fn track_datasets(&self) -> Vec<&str> {
        let mut datasets = self.reference_datasets().to_vec();
        datasets.extend(self.photon_datasets.iter().map(String::as_str));
        datasets
    }
}

/// Outcome of the extraction of one ground track.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackOutcome {
    /// Rows were copied.
    Extracted {
        photon_range: IndexRange,
        count_range: IndexRange,
    },
    /// No segment lies inside the bounding box.
    Empty,
    /// The source has no such ground track.
    Missing,
    /// The track is malformed and was not copied.
    Skipped { reason: String },
}

/// Outcome of one ground track, by name.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackSummary {
    pub name: String,
    pub outcome: TrackOutcome,
}

/// Result of an extraction run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionSummary {
    /// One entry per requested ground track, in request order
    pub tracks: Vec<TrackSummary>,
    /// Number of scalar datasets copied
    pub scalars_copied: usize,
}

impl ExtractionSummary {
    /// Number of tracks with copied rows.
    pub fn extracted(&self) -> usize {
        self.count(|outcome| matches!(outcome, TrackOutcome::Extracted { .. }))
    }

    /// Number of tracks without segments in the bounding box.
    pub fn empty(&self) -> usize {
        self.count(|outcome| *outcome == TrackOutcome::Empty)
    }

    /// Number of tracks that were missing or malformed.
    pub fn skipped(&self) -> usize {
        self.count(|outcome| {
            matches!(outcome, TrackOutcome::Missing | TrackOutcome::Skipped { .. })
        })
    }

    /// Outcome of a ground track.
    pub fn outcome(&self, name: &str) -> Option<&TrackOutcome> {
        self.tracks
            .iter()
            .find(|track| track.name == name)
            .map(|track| &track.outcome)
    }

    fn count(&self, predicate: impl Fn(&TrackOutcome) -> bool) -> usize {
        self.tracks
            .iter()
            .filter(|track| predicate(&track.outcome))
            .count()
    }
}

/// Extraction state of a track between steps.
struct Track {
    name: String,
    /// Source metadata of [TrackLayout::track_datasets]
    metas: Vec<DatasetMeta>,
    outcome: Option<TrackOutcome>,
}

impl Track {
    fn skip(&mut self, error: SubsetError) -> Result<(), SubsetError> {
        if !error.is_track_local() {
            return Err(error);
        }
        warn!(track = %self.name, %error, "skipping ground track");
        self.outcome = Some(TrackOutcome::Skipped {
            reason: error.to_string(),
        });
        Ok(())
    }

    fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Copies the part of a source store inside a bounding box into a destination store.
#[derive(Debug)]
pub struct RegionExtractor {
    source: Arc<dyn ArrayStore>,
    destination: Arc<dyn ArrayStore>,
    layout: TrackLayout,
    bbox: BoundingBox,
}

impl RegionExtractor {
    /// Return a new RegionExtractor object.
    ///
    /// # Arguments
    ///
    /// * `source`: Store to read
    /// * `destination`: Empty store to write
    /// * `layout`: Ground tracks and datasets to copy
    /// * `bbox`: Region to extract
    pub fn new(
        source: Arc<dyn ArrayStore>,
        destination: Arc<dyn ArrayStore>,
        mut layout: TrackLayout,
        bbox: BoundingBox,
    ) -> Self {
        layout.ground_tracks = distinct(std::mem::take(&mut layout.ground_tracks));
        RegionExtractor {
            source,
            destination,
            layout,
            bbox,
        }
    }

    /// Run the extraction.
    ///
    /// Malformed ground tracks are logged and skipped. Other errors abort the run.
    pub async fn run(&self) -> Result<ExtractionSummary, SubsetError> {
        info!(
            lat_range = %format!("{:.4} - {:.4}", self.bbox.min_lat, self.bbox.max_lat),
            lon_range = %format!("{:.4} - {:.4}", self.bbox.min_lon, self.bbox.max_lon),
            "extracting region"
        );
        let root = NodePath::root();
        let source_root = CollectionManager::new(self.source.clone(), &root, &[]).await?;
        let destination_root =
            CollectionManager::new(self.destination.clone(), &root, &[]).await?;

        let tracks = self.extract_tracks(&source_root, &destination_root).await?;
        let scalars_copied = self
            .copy_scalar_datasets(&source_root, &destination_root)
            .await?;
        self.copy_root_attributes(&source_root, &destination_root)
            .await?;

        let summary = ExtractionSummary {
            tracks: tracks
                .into_iter()
                .map(|track| TrackSummary {
                    name: track.name,
                    outcome: track.outcome.unwrap_or(TrackOutcome::Missing),
                })
                .collect(),
            scalars_copied,
        };
        info!(
            extracted = summary.extracted(),
            empty = summary.empty(),
            skipped = summary.skipped(),
            "extraction complete"
        );
        Ok(summary)
    }

    async fn extract_tracks(
        &self,
        source_root: &CollectionManager,
        destination_root: &CollectionManager,
    ) -> Result<Vec<Track>, SubsetError> {
        let mut tracks: Vec<Track> = self
            .layout
            .ground_tracks
            .iter()
            .map(|name| Track {
                name: name.clone(),
                metas: vec![],
                outcome: None,
            })
            .collect();
        if tracks.is_empty() {
            return Ok(tracks);
        }

        // Ground tracks present in the source.
        let names: Vec<&str> = self.layout.ground_tracks.iter().map(String::as_str).collect();
        let kinds = source_root.child_kinds(&names).await?;
        for (track, kind) in tracks.iter_mut().zip(kinds) {
            match kind {
                Some(NodeKind::Group) => {}
                Some(NodeKind::Dataset) => {
                    warn!(track = %track.name, "ground track is not a group");
                    track.outcome = Some(TrackOutcome::Skipped {
                        reason: format!("{} is not a group", track.name),
                    });
                }
                None => {
                    warn!(track = %track.name, "ground track not found");
                    track.outcome = Some(TrackOutcome::Missing);
                }
            }
        }
        let present = pending_names(&tracks);
        if present.is_empty() {
            return Ok(tracks);
        }
        destination_root.create_groups(&present).await?;

        // Every dataset of every present track must exist.
        let datasets = self.layout.track_datasets();
        let source_tracks =
            CollectionManager::new(source_root.store().clone(), &NodePath::root(), &present)
                .await?;
        let kinds = source_tracks.child_kinds(&datasets).await?;
        let pending = tracks.iter_mut().filter(|track| track.is_pending());
        for (track, kinds) in pending.zip(kinds.chunks(datasets.len())) {
            if let Some((dataset, _)) = datasets
                .iter()
                .zip(kinds)
                .find(|(_, kind)| **kind != Some(NodeKind::Dataset))
            {
                warn!(track = %track.name, dataset, "dataset not found");
                track.outcome = Some(TrackOutcome::Skipped {
                    reason: format!("{}/{} not found", track.name, dataset),
                });
            }
        }
        let present = pending_names(&tracks);
        if present.is_empty() {
            return Ok(tracks);
        }

        // Source metadata of every dataset, then the coordinates of every track.
        let paths = track_paths(&present, &datasets);
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        let source_datasets =
            CollectionManager::new(self.source.clone(), &NodePath::root(), &paths).await?;
        let metas = source_datasets.dataset_metas().await?;
        let coordinate_paths = track_paths(
            &present,
            &[self.layout.latitude.as_str(), self.layout.longitude.as_str()],
        );
        let coordinate_paths: Vec<&str> = coordinate_paths.iter().map(String::as_str).collect();
        let coordinates =
            CollectionManager::new(self.source.clone(), &NodePath::root(), &coordinate_paths)
                .await?
                .read_all()
                .await?;

        let mut photon_ranges = Vec::new();
        let pending: Vec<&mut Track> = tracks
            .iter_mut()
            .filter(|track| track.is_pending())
            .collect();
        for ((track, metas), coordinates) in pending
            .into_iter()
            .zip(metas.chunks(datasets.len()))
            .zip(coordinates.chunks(2))
        {
            track.metas = metas.to_vec();
            match self.photon_range(track, coordinates) {
                Ok(Some(range)) => {
                    info!(track = %track.name, %range, "got index range");
                    photon_ranges.push((track.name.clone(), range));
                }
                Ok(None) => {
                    warn!(track = %track.name, "no index range found for ground track");
                    track.outcome = Some(TrackOutcome::Empty);
                }
                Err(error) => track.skip(error)?,
            }
        }

        // Segment count prefixes of the tracks with segments in the box.
        let mut plans = Vec::new();
        if !photon_ranges.is_empty() {
            let count_paths: Vec<String> = photon_ranges
                .iter()
                .map(|(name, _)| format!("{}/{}", name, self.layout.segment_counts))
                .collect();
            let count_paths: Vec<&str> = count_paths.iter().map(String::as_str).collect();
            let selections: Vec<Selection> = photon_ranges
                .iter()
                .map(|(_, range)| Selection::rows(IndexRange::new(0, range.max)))
                .collect();
            let counts =
                CollectionManager::new(self.source.clone(), &NodePath::root(), &count_paths)
                    .await?
                    .read_selections(&selections)
                    .await?;
            for ((name, photon_range), counts) in photon_ranges.into_iter().zip(&counts) {
                let Some(track) = tracks.iter_mut().find(|track| track.name == name) else {
                    continue;
                };
                match self.count_range(track, counts, photon_range) {
                    Ok(count_range) => {
                        info!(track = %track.name, %count_range, "got photon count range");
                        plans.push((track.name.clone(), photon_range, count_range));
                    }
                    Err(error) => track.skip(error)?,
                }
            }
        }

        self.stamp_index_ranges(&tracks, &plans).await?;
        if !plans.is_empty() {
            self.copy_track_datasets(destination_root, &tracks, &plans)
                .await?;
        }
        for (name, photon_range, count_range) in plans {
            if let Some(track) = tracks.iter_mut().find(|track| track.name == name) {
                track.outcome = Some(TrackOutcome::Extracted {
                    photon_range,
                    count_range,
                });
            }
        }
        Ok(tracks)
    }

    /// Resolve the segments of a track inside the bounding box.
    fn photon_range(
        &self,
        track: &Track,
        coordinates: &[Option<ArrayData>],
    ) -> Result<Option<IndexRange>, SubsetError> {
        let [lat, lon] = coordinates else {
            return Err(coordinate_shape_mismatch(track, "coordinates", vec![], vec![]));
        };
        let (Some(lat), Some(lon)) = (lat, lon) else {
            return Err(coordinate_shape_mismatch(track, "coordinates", vec![1], vec![]));
        };
        let lat = lat.to_f64_vec()?;
        let lon = lon.to_f64_vec()?;
        if lat.len() != lon.len() {
            return Err(coordinate_shape_mismatch(
                track,
                "reference coordinates",
                vec![lat.len()],
                vec![lon.len()],
            ));
        }
        // The segment count array runs parallel to the coordinates.
        let counts = &track.metas[2];
        if counts.shape.first() != Some(&lat.len()) {
            return Err(coordinate_shape_mismatch(
                track,
                "segment photon counts",
                vec![lat.len()],
                counts.shape.clone(),
            ));
        }
        find_range(&lat, &lon, &self.bbox)
    }

    /// Resolve the photons covered by a range of segments and check the per-photon datasets.
    fn count_range(
        &self,
        track: &Track,
        counts: &ArrayData,
        photon_range: IndexRange,
    ) -> Result<IndexRange, SubsetError> {
        let count_range = photon_count_range(counts, photon_range)?;
        let photon_metas = &track.metas[3..];
        for (dataset, meta) in self.layout.photon_datasets.iter().zip(photon_metas) {
            let extent = meta.shape.first().copied().unwrap_or(0);
            if extent < count_range.max {
                return Err(SubsetError::ShapeMismatch {
                    what: format!("{}/{}", track.name, dataset),
                    expected: vec![count_range.max],
                    actual: meta.shape.clone(),
                });
            }
        }
        Ok(count_range)
    }

    /// Record the segment range of every track with an outcome of its range search.
    async fn stamp_index_ranges(
        &self,
        tracks: &[Track],
        plans: &[(String, IndexRange, IndexRange)],
    ) -> Result<(), SubsetError> {
        let mut names = Vec::new();
        let mut mins = Vec::new();
        let mut maxs = Vec::new();
        for track in tracks {
            if track.outcome == Some(TrackOutcome::Empty) {
                names.push(track.name.as_str());
                mins.push(json!(-1));
                maxs.push(json!(-1));
            }
        }
        for (name, photon_range, _) in plans {
            names.push(name.as_str());
            mins.push(json!(photon_range.min));
            maxs.push(json!(photon_range.max));
        }
        if names.is_empty() {
            return Ok(());
        }
        let groups =
            CollectionManager::new(self.destination.clone(), &NodePath::root(), &names).await?;
        groups
            .set_attributes(&vec![INDEX_RANGE_MIN; names.len()], &mins)
            .await?;
        groups
            .set_attributes(&vec![INDEX_RANGE_MAX; names.len()], &maxs)
            .await
    }

    /// Copy the planned rows of every reference and per-photon dataset.
    async fn copy_track_datasets(
        &self,
        destination_root: &CollectionManager,
        tracks: &[Track],
        plans: &[(String, IndexRange, IndexRange)],
    ) -> Result<(), SubsetError> {
        let datasets = self.layout.track_datasets();
        let names: Vec<&str> = plans.iter().map(|(name, _, _)| name.as_str()).collect();

        // Intermediate groups, parents before children.
        let destination_tracks =
            CollectionManager::new(self.destination.clone(), &NodePath::root(), &names).await?;
        for group in ancestors(&datasets) {
            destination_tracks.create_groups(&[group.as_str()]).await?;
        }

        let mut paths = Vec::new();
        let mut metas = Vec::new();
        let mut selections = Vec::new();
        for (name, photon_range, count_range) in plans {
            let Some(track) = tracks.iter().find(|track| &track.name == name) else {
                continue;
            };
            for (index, (dataset, meta)) in datasets.iter().zip(&track.metas).enumerate() {
                let range = if index < 3 { photon_range } else { count_range };
                paths.push(format!("{}/{}", name, dataset));
                metas.push(meta.with_extent(range.len()));
                selections.push(Selection::rows(*range));
                debug!(track = %name, dataset, %range, "planned dataset copy");
            }
        }
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        let destination = destination_root.create_datasets_with(&paths, &metas).await?;
        info!(datasets = destination.count(), "created datasets");
        let arrays = CollectionManager::new(self.source.clone(), &NodePath::root(), &paths)
            .await?
            .read_selections(&selections)
            .await?;
        let all = vec![Selection::all(); arrays.len()];
        destination.write_selections(&all, &arrays).await
    }

    /// Copy the scalar datasets present in the source. Returns the number copied.
    async fn copy_scalar_datasets(
        &self,
        source_root: &CollectionManager,
        destination_root: &CollectionManager,
    ) -> Result<usize, SubsetError> {
        let scalars: Vec<&str> = self
            .layout
            .scalar_datasets
            .iter()
            .map(String::as_str)
            .collect();
        if scalars.is_empty() {
            return Ok(0);
        }
        let kinds = source_root.child_kinds(&scalars).await?;
        let present: Vec<&str> = scalars
            .iter()
            .zip(kinds)
            .filter_map(|(scalar, kind)| {
                if kind == Some(NodeKind::Dataset) {
                    Some(*scalar)
                } else {
                    warn!(dataset = scalar, "scalar dataset not found");
                    None
                }
            })
            .collect();
        if present.is_empty() {
            return Ok(0);
        }

        let groups = ancestors(&present);
        if !groups.is_empty() {
            let group_names: Vec<&str> = groups.iter().map(String::as_str).collect();
            let existing = destination_root.child_kinds(&group_names).await?;
            for (group, kind) in group_names.iter().zip(existing) {
                if kind.is_none() {
                    destination_root.create_groups(&[*group]).await?;
                }
            }
        }

        let source =
            CollectionManager::new(self.source.clone(), &NodePath::root(), &present).await?;
        let metas = source.dataset_metas().await?;
        let all = vec![Selection::all(); present.len()];
        let arrays = source.read_selections(&all).await?;
        let destination = destination_root.create_datasets_with(&present, &metas).await?;
        destination.write_selections(&all, &arrays).await?;
        info!(datasets = present.len(), "copied scalar datasets");
        Ok(present.len())
    }

    /// Copy the source root attributes, then record the bounding box.
    async fn copy_root_attributes(
        &self,
        source_root: &CollectionManager,
        destination_root: &CollectionManager,
    ) -> Result<(), SubsetError> {
        let attributes = source_root
            .attribute_maps()
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        if !attributes.is_empty() {
            let names: Vec<&str> = attributes.keys().map(String::as_str).collect();
            let values: Vec<AttrValue> = attributes.values().cloned().collect();
            destination_root.set_attributes(&names, &values).await?;
        }
        destination_root
            .set_attributes(
                &["min_lat", "max_lat", "min_lon", "max_lon"],
                &[
                    json!(self.bbox.min_lat),
                    json!(self.bbox.max_lat),
                    json!(self.bbox.min_lon),
                    json!(self.bbox.max_lon),
                ],
            )
            .await
    }
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn pending_names(tracks: &[Track]) -> Vec<&str> {
    tracks
        .iter()
        .filter(|track| track.is_pending())
        .map(|track| track.name.as_str())
        .collect()
}

/// Every combination of track and dataset, in track-major order.
fn track_paths(tracks: &[&str], datasets: &[&str]) -> Vec<String> {
    tracks
        .iter()
        .flat_map(|track| {
            datasets
                .iter()
                .map(move |dataset| format!("{}/{}", track, dataset))
        })
        .collect()
}

/// Relative paths of the groups enclosing some datasets, parents before children.
fn ancestors(datasets: &[&str]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for dataset in datasets {
        let components: Vec<&str> = dataset.split('/').filter(|c| !c.is_empty()).collect();
        for depth in 1..components.len() {
            let group = components[..depth].join("/");
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
    }
    groups.sort_by_key(|group| group.matches('/').count());
    groups
}

fn coordinate_shape_mismatch(
    track: &Track,
    what: &str,
    expected: Vec<usize>,
    actual: Vec<usize>,
) -> SubsetError {
    SubsetError::ShapeMismatch {
        what: format!("{} {}", track.name, what),
        expected,
        actual,
    }
}

/// Drop repeated names, keeping the first occurrence of each.
fn distinct(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
