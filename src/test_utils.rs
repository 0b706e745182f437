use crate::array::ArrayData;
use crate::models::Selection;
use crate::store::memory::MemoryStore;
use crate::store::{ArrayStore, NodePath};

use ndarray::{arr0, Array1, Array2};
use serde_json::json;
use std::sync::Arc;

/// Create a dataset and fill it with `data`.
pub(crate) async fn write_dataset(store: &MemoryStore, path: &str, data: ArrayData) {
    let path = NodePath::parse(path);
    for ancestor in path.components().scan(NodePath::root(), |parent, name| {
        *parent = parent.join(name);
        Some(parent.clone())
    }) {
        if ancestor != path && store.node_kind(&ancestor).await.unwrap().is_none() {
            store.create_group(&ancestor).await.unwrap();
        }
    }
    store.create_dataset(&path, &data.meta()).await.unwrap();
    store.write(&path, &Selection::all(), &data).await.unwrap();
}

/// Write a ground track with the ATL03 datasets.
///
/// Per-photon datasets have `photons` rows and row `i` holds the value `i`. The signal
/// confidence has one column per surface type.
pub(crate) async fn write_track(
    store: &MemoryStore,
    name: &str,
    lat: &[f64],
    lon: &[f64],
    counts: &[i32],
    photons: usize,
) {
    let f64_data = |values: &[f64]| ArrayData::from(Array1::from(values.to_vec()).into_dyn());
    let geolocation = format!("{}/geolocation", name);
    let heights = format!("{}/heights", name);
    write_dataset(store, &format!("{}/reference_photon_lat", geolocation), f64_data(lat)).await;
    write_dataset(store, &format!("{}/reference_photon_lon", geolocation), f64_data(lon)).await;
    write_dataset(
        store,
        &format!("{}/segment_ph_cnt", geolocation),
        ArrayData::from(Array1::from(counts.to_vec()).into_dyn()),
    )
    .await;

    let rows = Array1::from_iter((0..photons).map(|i| i as f64));
    for dataset in ["dist_ph_along", "lat_ph", "lon_ph", "delta_time"] {
        write_dataset(
            store,
            &format!("{}/{}", heights, dataset),
            ArrayData::from(rows.clone().into_dyn()),
        )
        .await;
    }
    write_dataset(
        store,
        &format!("{}/h_ph", heights),
        ArrayData::from(rows.mapv(|value| value as f32).into_dyn()),
    )
    .await;
    write_dataset(
        store,
        &format!("{}/quality_ph", heights),
        ArrayData::from(rows.mapv(|value| value as i8).into_dyn()),
    )
    .await;
    write_dataset(
        store,
        &format!("{}/signal_conf_ph", heights),
        ArrayData::from(Array2::from_shape_fn((photons, 5), |(i, _)| i as i8).into_dyn()),
    )
    .await;
}

/// A synthetic ATL03 granule in a memory store.
///
/// With the bounding box `lon [-1, 1], lat [15, 35]`:
///
/// * `gt1l` has segments 1 and 2 inside the box, covering photons 2 to 4
/// * `gt1r` lies outside the box
/// * `gt2l` has latitudes and longitudes of different lengths
/// * the other ground tracks are missing
pub(crate) async fn granule() -> Arc<dyn ArrayStore> {
    let store = MemoryStore::new();
    let root = NodePath::root();
    store
        .set_attribute(&root, "short_name", &json!("ATL03"))
        .await
        .unwrap();
    write_track(
        &store,
        "gt1l",
        &[10.0, 20.0, 30.0, 40.0],
        &[0.0, 0.0, 0.0, 0.0],
        &[2, 3, 0, 5],
        10,
    )
    .await;
    write_track(
        &store,
        "gt1r",
        &[50.0, 60.0, 70.0, 80.0],
        &[0.0, 0.0, 0.0, 0.0],
        &[1, 1, 1, 1],
        4,
    )
    .await;
    write_track(
        &store,
        "gt2l",
        &[10.0, 20.0, 30.0, 40.0],
        &[0.0, 0.0, 0.0],
        &[1, 1, 1, 1],
        4,
    )
    .await;
    write_dataset(
        &store,
        "orbit_info/sc_orient",
        ArrayData::from(arr0(1i8).into_dyn()),
    )
    .await;
    write_dataset(
        &store,
        "ancillary_data/start_rgt",
        ArrayData::from(Array1::from(vec![1234i32]).into_dyn()),
    )
    .await;
    write_dataset(
        &store,
        "ancillary_data/start_cycle",
        ArrayData::from(Array1::from(vec![1i32]).into_dyn()),
    )
    .await;
    Arc::new(store)
}
