//! # Scene Event Broadcast
//!
//! Structural changes, update phases and async-load progress are fanned out
//! to subscribers over channels. Downstream systems (renderer bridge,
//! physics bridge, loading screens) subscribe once and drain at their own
//! cadence; a dropped receiver silently unsubscribes.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Broadcast notification emitted by a scene.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A node was registered with the scene.
    NodeAdded {
        /// Scene identifier of the node.
        id: u32,
    },
    /// A node was unregistered from the scene.
    NodeRemoved {
        /// Identifier the node held while registered.
        id: u32,
    },
    /// A component was attached and registered.
    ComponentAdded {
        /// Owning node identifier.
        node_id: u32,
        /// Component identifier.
        component_id: u32,
    },
    /// A component was detached and unregistered.
    ComponentRemoved {
        /// Owning node identifier.
        node_id: u32,
        /// Identifier the component held while registered.
        component_id: u32,
    },
    /// Variable-timestep logic phase of the frame update.
    Update {
        /// Scaled time step in seconds.
        time_step: f32,
    },
    /// Subsystem phase; physics stepping happens here.
    SubsystemUpdate {
        /// Scaled time step in seconds.
        time_step: f32,
    },
    /// Transform-smoothing phase.
    UpdateSmoothing {
        /// Blend factor `1 - 2^(-dt * smoothing_constant)`, clamped to
        /// `[0, 1]`.
        constant: f32,
        /// Squared teleport threshold for smoothing consumers.
        squared_snap_threshold: f32,
    },
    /// Post-update logic phase; observes smoothed transforms.
    PostUpdate {
        /// Scaled time step in seconds.
        time_step: f32,
    },
    /// Progressive load advanced by one slice.
    AsyncLoadProgress {
        /// Root-level child nodes read so far.
        loaded: u32,
        /// Total root-level child nodes in the stream.
        total: u32,
    },
    /// Progressive load left the loading state.
    AsyncLoadFinished {
        /// False if the load aborted on a malformed stream.
        success: bool,
    },
}

/// Fan-out point for [`SceneEvent`] values.
#[derive(Debug, Default)]
pub struct EventHub {
    senders: Vec<Sender<SceneEvent>>,
}

impl EventHub {
    /// Creates a hub with no subscribers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&mut self) -> Receiver<SceneEvent> {
        let (sender, receiver) = unbounded();
        self.senders.push(sender);
        receiver
    }

    /// Returns the current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }

    /// Broadcasts an event to every live subscriber.
    ///
    /// Subscribers whose receiver has been dropped are pruned here.
    pub fn emit(&mut self, event: &SceneEvent) {
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let mut hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.emit(&SceneEvent::NodeAdded { id: 7 });

        assert_eq!(a.try_recv().unwrap(), SceneEvent::NodeAdded { id: 7 });
        assert_eq!(b.try_recv().unwrap(), SceneEvent::NodeAdded { id: 7 });
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut hub = EventHub::new();
        let keep = hub.subscribe();
        drop(hub.subscribe());

        hub.emit(&SceneEvent::NodeRemoved { id: 1 });
        assert_eq!(hub.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
