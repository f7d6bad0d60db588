//! Channel routing between a node and one of its connections
//!
//! A connection may carry a subset of the node's channels, in any order, and
//! (for outputs) the same node channel more than once. The map translates
//! between the node's channel indices and the connection's local indices.

/// Per-connection lookup between node channels and local channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    /// Indexed by node channel: the local channel carrying it, if any.
    forward: Vec<Option<usize>>,
    /// Indexed by local channel: the node channel it carries.
    inverse: Vec<usize>,
}

impl ChannelMap {
    /// Build the map for a node with `node_channels` channels.
    ///
    /// An empty `selection` maps every node channel to itself. Otherwise
    /// `selection[i] == c` means local channel `i` carries node channel `c`;
    /// when `c` repeats, the forward table keeps the last local index.
    ///
    /// # Panics
    /// Panics if any entry of `selection` is `>= node_channels`.
    pub fn new(node_channels: usize, selection: &[usize]) -> Self {
        if selection.is_empty() {
            return Self::identity(node_channels);
        }

        let mut forward = vec![None; node_channels];
        for (local, &c) in selection.iter().enumerate() {
            assert!(
                c < node_channels,
                "channel {} out of range for {} channels",
                c,
                node_channels
            );
            forward[c] = Some(local);
        }

        Self {
            forward,
            inverse: selection.to_vec(),
        }
    }

    pub fn identity(channels: usize) -> Self {
        Self {
            forward: (0..channels).map(Some).collect(),
            inverse: (0..channels).collect(),
        }
    }

    /// Local channel carrying node channel `node_channel`, or `None` if this
    /// connection does not carry it.
    #[inline]
    pub fn map_forward(&self, node_channel: usize) -> Option<usize> {
        self.forward[node_channel]
    }

    /// Node channel carried by local channel `local`.
    #[inline]
    pub fn map_inverse(&self, local: usize) -> usize {
        self.inverse[local]
    }

    /// Number of channels on the connection side.
    pub fn local_channels(&self) -> usize {
        self.inverse.len()
    }

    /// Number of channels on the node side.
    pub fn node_channels(&self) -> usize {
        self.forward.len()
    }
}
