use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chanmux_frame::{ChannelId, Frame};
use tokio::sync::mpsc;

use crate::error::{BoxError, MuxError};

/// Decodes a payload and discards the value, keeping only the verdict.
pub(crate) type PayloadCheck = Box<dyn Fn(Bytes) -> Result<(), BoxError> + Send + Sync>;

/// Outcome of routing one inbound frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Payload handed to the channel's read side.
    Delivered(ChannelId),
    /// No channel is registered under this id.
    Unknown(u64),
    /// The channel's read side has ended; its route is now gone.
    Closed(ChannelId),
}

struct Route {
    queue: mpsc::Sender<Bytes>,
    check: Option<PayloadCheck>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("queue", &self.queue)
            .field("checked", &self.check.is_some())
            .finish()
    }
}

/// Routing table from channel id to each channel's inbound queue.
///
/// Owned by the inbound half of the driver. Only payloads cross into the
/// channel; decoding happens on the channel's read side. A route installed
/// with a check has its payloads decoded here first, so a bad payload is
/// caught even when nobody reads that channel.
///
/// Delivery awaits queue capacity, so one full channel stalls routing for
/// every channel on the connection until its reader catches up.
#[derive(Debug, Default)]
pub(crate) struct Router {
    routes: HashMap<ChannelId, Route>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, id: ChannelId) -> bool {
        self.routes.contains_key(&id)
    }

    pub(crate) fn insert(
        &mut self,
        id: ChannelId,
        queue: mpsc::Sender<Bytes>,
        check: Option<PayloadCheck>,
    ) {
        self.routes.insert(id, Route { queue, check });
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.routes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Parse the channel id off `body` and forward the payload.
    ///
    /// Waits while the target channel's queue is full. Fails with
    /// [`MuxError::MalformedVarint`] when the id prefix is malformed and with
    /// [`MuxError::DecodeFailed`] when the route's check rejects the payload;
    /// nothing is forwarded in either case.
    pub(crate) async fn route(&mut self, body: Bytes) -> Result<Routed, MuxError> {
        let frame = Frame::parse(body).map_err(|_| MuxError::MalformedVarint)?;
        let Some(id) = ChannelId::new(frame.channel) else {
            return Ok(Routed::Unknown(frame.channel));
        };
        let Some(route) = self.routes.get(&id) else {
            return Ok(Routed::Unknown(frame.channel));
        };

        if let Some(check) = &route.check {
            check(frame.payload.clone())
                .map_err(|source| MuxError::DecodeFailed { channel: id, source })?;
        }
        if route.queue.send(frame.payload).await.is_err() {
            self.routes.remove(&id);
            return Ok(Routed::Closed(id));
        }
        Ok(Routed::Delivered(id))
    }
}
