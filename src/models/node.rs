//! Nodes, coordinate keys, clusters, and checkpoint candidates.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// Decimal places kept by [`CoordKey`] unless configured otherwise.
pub const DEFAULT_COORD_PRECISION: u32 = 6;

/// Identifier of a service cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinate identity of a node.
///
/// Latitude and longitude are scaled by `10^precision` and rounded half away
/// from zero to integers, so two coordinates that print identically at that
/// precision compare equal. The precision is part of the key: keys built
/// with different precisions never compare equal.
///
/// # Examples
///
/// ```
/// use u_delivery::models::CoordKey;
///
/// let a = CoordKey::new(3.1279931, 101.4669724, 6);
/// let b = CoordKey::new(3.1279929, 101.4669718, 6);
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "3.127993,101.466972");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoordKey {
    lat_e: i64,
    lon_e: i64,
    precision: u32,
}

impl CoordKey {
    /// Builds a key at the given decimal precision.
    pub fn new(lat: f64, lon: f64, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        Self {
            lat_e: (lat * scale).round() as i64,
            lon_e: (lon * scale).round() as i64,
            precision,
        }
    }

    /// Scaled latitude.
    pub fn lat_e(&self) -> i64 {
        self.lat_e
    }

    /// Scaled longitude.
    pub fn lon_e(&self) -> i64 {
        self.lon_e
    }

    /// Decimal precision of this key.
    pub fn precision(&self) -> u32 {
        self.precision
    }
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.precision as usize;
        let scale = 10f64.powi(self.precision as i32);
        write!(
            f,
            "{:.p$},{:.p$}",
            self.lat_e as f64 / scale,
            self.lon_e as f64 / scale
        )
    }
}

/// What a node represents in a routing problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Depot,
    Stop,
    Checkpoint,
    Pickup,
    Dropoff,
}

/// A location taking part in a routing problem.
///
/// # Examples
///
/// ```
/// use u_delivery::models::{ClusterId, Node, NodeRole};
///
/// let depot = Node::depot(3.12, 101.46);
/// assert_eq!(depot.role(), NodeRole::Depot);
///
/// let cp = Node::checkpoint(7, 3.13, 101.47, [ClusterId(1), ClusterId(2)]);
/// assert!(cp.serves(ClusterId(2)));
/// assert!(!cp.is_dynamic());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: u64,
    lat: f64,
    lon: f64,
    role: NodeRole,
    is_dynamic: bool,
    cluster_refs: BTreeSet<ClusterId>,
    pair_ref: Option<u32>,
    key: CoordKey,
}

impl Node {
    /// Creates a node with the given role.
    pub fn new(id: u64, lat: f64, lon: f64, role: NodeRole) -> Self {
        Self {
            id,
            lat,
            lon,
            role,
            is_dynamic: matches!(role, NodeRole::Pickup | NodeRole::Dropoff),
            cluster_refs: BTreeSet::new(),
            pair_ref: None,
            key: CoordKey::new(lat, lon, DEFAULT_COORD_PRECISION),
        }
    }

    /// Creates the depot (id 0).
    pub fn depot(lat: f64, lon: f64) -> Self {
        Self::new(0, lat, lon, NodeRole::Depot)
    }

    /// Creates a delivery stop.
    pub fn stop(id: u64, lat: f64, lon: f64) -> Self {
        Self::new(id, lat, lon, NodeRole::Stop)
    }

    /// Creates a checkpoint serving the given clusters.
    pub fn checkpoint(
        id: u64,
        lat: f64,
        lon: f64,
        clusters: impl IntoIterator<Item = ClusterId>,
    ) -> Self {
        Self::new(id, lat, lon, NodeRole::Checkpoint).with_clusters(clusters)
    }

    /// Sets the clusters referenced by this node.
    pub fn with_clusters(mut self, clusters: impl IntoIterator<Item = ClusterId>) -> Self {
        self.cluster_refs = clusters.into_iter().collect();
        self
    }

    /// Links this node to a dynamic pickup/delivery pair.
    pub fn with_pair(mut self, pair_id: u32) -> Self {
        self.pair_ref = Some(pair_id);
        self
    }

    /// Rebuilds the coordinate key at another precision.
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.key = CoordKey::new(self.lat, self.lon, precision);
        self
    }

    /// Node ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Latitude in decimal degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in decimal degrees.
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Role of this node.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// `true` for pickups and dropoffs added after the initial plan.
    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    /// Clusters this node belongs to (stops) or serves (checkpoints).
    pub fn cluster_refs(&self) -> &BTreeSet<ClusterId> {
        &self.cluster_refs
    }

    /// Returns `true` if this node references the given cluster.
    pub fn serves(&self, cluster: ClusterId) -> bool {
        self.cluster_refs.contains(&cluster)
    }

    /// Dynamic pair this node belongs to, if any.
    pub fn pair_ref(&self) -> Option<u32> {
        self.pair_ref
    }

    /// Coordinate key, built once at construction.
    pub fn key(&self) -> CoordKey {
        self.key
    }

    /// Rejects non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(RoutingError::Input(format!(
                "node {} has non-finite coordinates",
                self.id
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(RoutingError::Input(format!(
                "node {} has out-of-range coordinates ({}, {})",
                self.id, self.lat, self.lon
            )));
        }
        Ok(())
    }
}

/// A checkpoint proposed by checkpoint discovery.
///
/// Only coordinates and cluster coverage are used; `confidence` is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCandidate {
    /// Discovery-side identifier.
    pub id: u64,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Clusters reachable through this checkpoint.
    pub clusters_served: BTreeSet<ClusterId>,
    /// Discovery confidence, not validated.
    pub confidence: f64,
}

impl CheckpointCandidate {
    /// Converts the candidate into a checkpoint node.
    pub fn to_node(&self) -> Node {
        Node::checkpoint(
            self.id,
            self.lat,
            self.lon,
            self.clusters_served.iter().copied(),
        )
    }
}

/// A new pickup/delivery request routed through chosen checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPair {
    id: u32,
    pickup: Node,
    dropoff: Node,
}

impl DynamicPair {
    /// Creates a pair; both nodes are re-tagged as dynamic pickup/dropoff
    /// linked to `id`.
    pub fn new(id: u32, pickup: Node, dropoff: Node) -> Self {
        let retag = |node: Node, role: NodeRole| Node {
            role,
            is_dynamic: true,
            pair_ref: Some(id),
            ..node
        };
        Self {
            id,
            pickup: retag(pickup, NodeRole::Pickup),
            dropoff: retag(dropoff, NodeRole::Dropoff),
        }
    }

    /// Pair ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Pickup checkpoint.
    pub fn pickup(&self) -> &Node {
        &self.pickup
    }

    /// Delivery checkpoint.
    pub fn dropoff(&self) -> &Node {
        &self.dropoff
    }
}
