//! Shared stream registry: named, ref-counted origin streams with
//! ring-buffer warm-up, per-subscriber bounded queues and linger
//! teardown.

use std::{
  collections::HashMap,
  pin::Pin,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  },
  time::Duration,
};

use flotilla_client::entities::error::ErrorCode;
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use strum::Display;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{OpError, OpResult};

pub mod ring;
pub mod self_monitor;

use ring::FrameRing;

/// Pre-rendered outbound frame, shared between all subscribers.
pub type Frame = Arc<str>;

/// The origin side: anything producing rendered frames.
pub type FrameStream =
  Pin<Box<dyn Stream<Item = anyhow::Result<Frame>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamKind {
  Logs,
  Stats,
  Events,
}

/// Identity of one shared stream: host + resource + the exact
/// origin parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamScope {
  pub kind: StreamKind,
  pub host_id: String,
  pub resource_id: String,
  pub fingerprint: String,
}

/// Stable digest over origin parameters, so `follow=true` and
/// `follow=false` subscribers never share a stream.
pub fn fingerprint(params: &[(&str, &str)]) -> String {
  let mut hasher = Sha256::new();
  for (key, value) in params {
    hasher.update(key.as_bytes());
    hasher.update(b"=");
    hasher.update(value.as_bytes());
    hasher.update(b"\n");
  }
  hex::encode(&hasher.finalize()[..8])
}

pub enum StreamItem {
  Frame(Frame),
  End(EndReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
  /// This subscriber's queue overflowed and it was dropped.
  SlowConsumer,
  /// The origin stream finished or was torn down.
  OriginClosed,
}

#[derive(Default)]
pub struct RegistryMetrics {
  pub active_streams: AtomicUsize,
  pub subscribers: AtomicUsize,
  pub slow_consumer_drops: AtomicU64,
  pub frames_forwarded: AtomicU64,
}

pub use flotilla_client::entities::docker::StreamMetrics;

pub struct StreamRegistry {
  map: Mutex<HashMap<StreamScope, Arc<SharedStream>>>,
  ring_capacity: usize,
  queue_capacity: usize,
  linger: Duration,
  metrics: RegistryMetrics,
}

impl StreamRegistry {
  pub fn new(
    ring_capacity: usize,
    queue_capacity: usize,
    linger: Duration,
  ) -> StreamRegistry {
    StreamRegistry {
      map: Mutex::new(HashMap::new()),
      ring_capacity,
      queue_capacity,
      linger,
      metrics: RegistryMetrics::default(),
    }
  }

  pub fn from_config() -> StreamRegistry {
    let config = crate::config::core_config();
    StreamRegistry::new(
      config.log_ring_capacity,
      config.subscriber_queue_capacity,
      Duration::from_secs(config.stream_linger_seconds),
    )
  }

  pub fn metrics(&self) -> StreamMetrics {
    StreamMetrics {
      active_streams: self
        .metrics
        .active_streams
        .load(Ordering::Relaxed),
      subscribers: self.metrics.subscribers.load(Ordering::Relaxed),
      slow_consumer_drops: self
        .metrics
        .slow_consumer_drops
        .load(Ordering::Relaxed),
      frames_forwarded: self
        .metrics
        .frames_forwarded
        .load(Ordering::Relaxed),
    }
  }

  /// Attach to the stream for `scope`, starting the origin if this
  /// is the first subscriber. `factory` is only awaited when a new
  /// origin is needed.
  pub async fn subscribe<F, Fut>(
    &'static self,
    scope: StreamScope,
    tail: Option<usize>,
    factory: F,
  ) -> OpResult<Subscription>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = OpResult<FrameStream>> + Send,
  {
    let shared = {
      let mut map = self.map.lock().unwrap();
      match map.get(&scope) {
        Some(shared) if !shared.is_ended() => shared.clone(),
        _ => {
          let shared = Arc::new(SharedStream::new(
            scope.clone(),
            self.ring_capacity,
            self.linger,
          ));
          map.insert(scope.clone(), shared.clone());
          self
            .metrics
            .active_streams
            .store(map.len(), Ordering::Relaxed);
          shared
        }
      }
    };

    let started = shared
      .origin
      .get_or_try_init(|| async {
        let stream = factory().await?;
        shared.spawn_pump(self, stream);
        Ok::<(), OpError>(())
      })
      .await;
    if let Err(e) = started {
      self.remove_entry(&shared);
      return Err(e);
    }

    shared
      .attach(tail, self.queue_capacity, &self.metrics)
      .ok_or_else(|| {
        OpError::msg(
          ErrorCode::ClosedByOrigin,
          "stream closed while attaching, reconnect to restart it",
        )
      })
  }

  fn remove_entry(&self, shared: &Arc<SharedStream>) {
    let mut map = self.map.lock().unwrap();
    if let Some(existing) = map.get(&shared.scope)
      && Arc::ptr_eq(existing, shared)
    {
      map.remove(&shared.scope);
    }
    self
      .metrics
      .active_streams
      .store(map.len(), Ordering::Relaxed);
  }
}

struct SubscriberHandle {
  tx: mpsc::Sender<StreamItem>,
  slow: Arc<AtomicBool>,
}

struct Inner {
  ring: FrameRing,
  subscribers: HashMap<u64, SubscriberHandle>,
  next_id: u64,
  /// Bumped on attach/detach so a pending linger timer can tell
  /// whether anything happened since it was armed.
  linger_epoch: u64,
  ended: bool,
}

pub struct SharedStream {
  scope: StreamScope,
  inner: Mutex<Inner>,
  origin: tokio::sync::OnceCell<()>,
  cancel: CancellationToken,
  linger: Duration,
}

impl SharedStream {
  fn new(
    scope: StreamScope,
    ring_capacity: usize,
    linger: Duration,
  ) -> SharedStream {
    SharedStream {
      scope,
      inner: Mutex::new(Inner {
        ring: FrameRing::new(ring_capacity),
        subscribers: HashMap::new(),
        next_id: 0,
        linger_epoch: 0,
        ended: false,
      }),
      origin: tokio::sync::OnceCell::new(),
      cancel: CancellationToken::new(),
      linger,
    }
  }

  fn is_ended(&self) -> bool {
    self.inner.lock().unwrap().ended
  }

  /// Single writer: pumps origin frames into the ring and every
  /// subscriber queue, in origin order.
  fn spawn_pump(
    self: &Arc<Self>,
    registry: &'static StreamRegistry,
    mut stream: FrameStream,
  ) {
    let shared = self.clone();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = shared.cancel.cancelled() => break,
          item = stream.next() => match item {
            Some(Ok(frame)) => {
              shared.broadcast(frame, &registry.metrics);
            }
            Some(Err(e)) => {
              debug!(
                "origin stream error | {} {}/{} | {e:#}",
                shared.scope.kind,
                shared.scope.host_id,
                shared.scope.resource_id,
              );
              break;
            }
            None => break,
          }
        }
      }
      shared.mark_ended(&registry.metrics);
      registry.remove_entry(&shared);
    });
  }

  fn broadcast(&self, frame: Frame, metrics: &RegistryMetrics) {
    let mut inner = self.inner.lock().unwrap();
    inner.ring.push(frame.clone());
    metrics.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    let mut dropped = Vec::new();
    for (id, subscriber) in inner.subscribers.iter() {
      match subscriber
        .tx
        .try_send(StreamItem::Frame(frame.clone()))
      {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
          // Never block the origin on the slowest reader.
          subscriber.slow.store(true, Ordering::Relaxed);
          metrics
            .slow_consumer_drops
            .fetch_add(1, Ordering::Relaxed);
          dropped.push(*id);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
          dropped.push(*id);
        }
      }
    }
    for id in dropped {
      if inner.subscribers.remove(&id).is_some() {
        metrics.subscribers.fetch_sub(1, Ordering::Relaxed);
      }
    }
  }

  fn attach(
    self: &Arc<Self>,
    tail: Option<usize>,
    queue_capacity: usize,
    metrics: &'static RegistryMetrics,
  ) -> Option<Subscription> {
    let mut inner = self.inner.lock().unwrap();
    if inner.ended {
      return None;
    }
    let id = inner.next_id;
    inner.next_id += 1;
    inner.linger_epoch += 1;

    let capacity = queue_capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let slow = Arc::new(AtomicBool::new(false));

    // Warm the fresh queue with recent history. Clamped to the
    // queue so an attach can never overflow itself.
    let replay = inner.ring.tail(tail);
    let skip = replay.len().saturating_sub(capacity);
    for frame in replay.into_iter().skip(skip) {
      let _ = tx.try_send(StreamItem::Frame(frame));
    }

    inner.subscribers.insert(
      id,
      SubscriberHandle {
        tx,
        slow: slow.clone(),
      },
    );
    metrics.subscribers.fetch_add(1, Ordering::Relaxed);

    Some(Subscription {
      id,
      rx,
      slow,
      shared: self.clone(),
      metrics,
      detached: false,
    })
  }

  fn detach(
    self: &Arc<Self>,
    id: u64,
    metrics: &RegistryMetrics,
  ) {
    let mut inner = self.inner.lock().unwrap();
    if inner.subscribers.remove(&id).is_some() {
      metrics.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
    if inner.subscribers.is_empty() && !inner.ended {
      // Last subscriber gone: arm the linger timer. A reattach
      // before expiry bumps the epoch and disarms it.
      inner.linger_epoch += 1;
      let armed_epoch = inner.linger_epoch;
      drop(inner);
      let shared = self.clone();
      tokio::spawn(async move {
        tokio::time::sleep(shared.linger).await;
        let inner = shared.inner.lock().unwrap();
        let expired = inner.linger_epoch == armed_epoch
          && inner.subscribers.is_empty();
        drop(inner);
        if expired {
          shared.cancel.cancel();
        }
      });
    }
  }

  fn mark_ended(&self, metrics: &RegistryMetrics) {
    let mut inner = self.inner.lock().unwrap();
    inner.ended = true;
    let remaining = inner.subscribers.len();
    // Dropping the senders ends every subscriber's queue.
    inner.subscribers.clear();
    if remaining > 0 {
      metrics
        .subscribers
        .fetch_sub(remaining, Ordering::Relaxed);
    }
  }
}

/// One subscriber's end of a shared stream. Dropping it detaches
/// synchronously; the last detach arms the linger timer.
pub struct Subscription {
  id: u64,
  rx: mpsc::Receiver<StreamItem>,
  slow: Arc<AtomicBool>,
  shared: Arc<SharedStream>,
  metrics: &'static RegistryMetrics,
  detached: bool,
}

impl Subscription {
  /// Next frame in origin order, or the end of this subscription.
  pub async fn next(&mut self) -> StreamItem {
    match self.rx.recv().await {
      Some(item) => item,
      None => {
        if self.slow.load(Ordering::Relaxed) {
          StreamItem::End(EndReason::SlowConsumer)
        } else {
          StreamItem::End(EndReason::OriginClosed)
        }
      }
    }
  }

  pub fn close(mut self) {
    self.detach();
  }

  fn detach(&mut self) {
    if !self.detached {
      self.detached = true;
      self.shared.detach(self.id, self.metrics);
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.detach();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry(
    ring: usize,
    queue: usize,
    linger_secs: u64,
  ) -> &'static StreamRegistry {
    Box::leak(Box::new(StreamRegistry::new(
      ring,
      queue,
      Duration::from_secs(linger_secs),
    )))
  }

  fn scope(tag: &str) -> StreamScope {
    StreamScope {
      kind: StreamKind::Logs,
      host_id: String::from("h1"),
      resource_id: String::from("c1"),
      fingerprint: String::from(tag),
    }
  }

  /// Origin fed by hand through an mpsc channel.
  fn feeder(
    capacity: usize,
  ) -> (mpsc::Sender<Frame>, FrameStream) {
    let (tx, rx) = mpsc::channel::<Frame>(capacity);
    let stream =
      tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok);
    (tx, Box::pin(stream))
  }

  async fn recv_frame(sub: &mut Subscription) -> String {
    match sub.next().await {
      StreamItem::Frame(frame) => frame.to_string(),
      StreamItem::End(reason) => {
        panic!("expected frame, stream ended: {reason:?}")
      }
    }
  }

  #[tokio::test(start_paused = true)]
  async fn fan_out_delivers_identical_suffix() {
    let registry = registry(10, 8, 5);
    let (tx, stream) = feeder(16);
    let mut stream = Some(stream);

    let mut first = registry
      .subscribe(scope("a"), Some(0), || async {
        Ok(stream.take().unwrap())
      })
      .await
      .unwrap();
    let mut second = registry
      .subscribe(scope("a"), Some(0), || async {
        panic!("origin must only be constructed once")
      })
      .await
      .unwrap();

    for n in 0..3 {
      tx.send(Arc::from(format!("frame-{n}").as_str()))
        .await
        .unwrap();
    }
    tokio::task::yield_now().await;

    for n in 0..3 {
      assert_eq!(recv_frame(&mut first).await, format!("frame-{n}"));
      assert_eq!(
        recv_frame(&mut second).await,
        format!("frame-{n}")
      );
    }
    assert_eq!(registry.metrics().active_streams, 1);
    assert_eq!(registry.metrics().subscribers, 2);
  }

  #[tokio::test(start_paused = true)]
  async fn late_subscriber_gets_ring_prefix() {
    let registry = registry(10, 8, 5);
    let (tx, stream) = feeder(16);
    let mut stream = Some(stream);

    let mut early = registry
      .subscribe(scope("a"), None, || async {
        Ok(stream.take().unwrap())
      })
      .await
      .unwrap();
    for n in 0..5 {
      tx.send(Arc::from(format!("frame-{n}").as_str()))
        .await
        .unwrap();
    }
    tokio::task::yield_now().await;
    for n in 0..5 {
      assert_eq!(recv_frame(&mut early).await, format!("frame-{n}"));
    }

    // tail=2 replays only the most recent two frames
    let mut late = registry
      .subscribe(scope("a"), Some(2), || async {
        panic!("origin already running")
      })
      .await
      .unwrap();
    assert_eq!(recv_frame(&mut late).await, "frame-3");
    assert_eq!(recv_frame(&mut late).await, "frame-4");

    // tail=0 sees live frames only
    let mut live_only = registry
      .subscribe(scope("a"), Some(0), || async {
        panic!("origin already running")
      })
      .await
      .unwrap();
    tx.send(Arc::from("frame-5")).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(recv_frame(&mut live_only).await, "frame-5");
  }

  #[tokio::test(start_paused = true)]
  async fn slow_consumer_is_dropped_without_blocking_others() {
    let registry = registry(64, 2, 5);
    let (tx, stream) = feeder(64);
    let mut stream = Some(stream);

    let mut reader = registry
      .subscribe(scope("a"), Some(0), || async {
        Ok(stream.take().unwrap())
      })
      .await
      .unwrap();
    let mut stalled = registry
      .subscribe(scope("a"), Some(0), || async {
        panic!("origin already running")
      })
      .await
      .unwrap();

    // Overflow the stalled subscriber's 2-slot queue while the
    // reader keeps draining.
    for n in 0..4 {
      tx.send(Arc::from(format!("frame-{n}").as_str()))
        .await
        .unwrap();
      tokio::task::yield_now().await;
      assert_eq!(
        recv_frame(&mut reader).await,
        format!("frame-{n}")
      );
    }

    // The stalled subscriber drains its queued frames, then learns
    // it was dropped as a slow consumer.
    assert_eq!(recv_frame(&mut stalled).await, "frame-0");
    assert_eq!(recv_frame(&mut stalled).await, "frame-1");
    assert!(matches!(
      stalled.next().await,
      StreamItem::End(EndReason::SlowConsumer)
    ));
    assert_eq!(registry.metrics().slow_consumer_drops, 1);

    // The healthy reader is unaffected.
    tx.send(Arc::from("frame-4")).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(recv_frame(&mut reader).await, "frame-4");
  }

  #[tokio::test(start_paused = true)]
  async fn origin_lingers_then_closes_after_last_detach() {
    let registry = registry(10, 8, 5);
    let (tx, stream) = feeder(16);
    let mut stream = Some(stream);

    let sub = registry
      .subscribe(scope("a"), Some(0), || async {
        Ok(stream.take().unwrap())
      })
      .await
      .unwrap();
    sub.close();

    // Still alive inside the linger window: reattach keeps it.
    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(registry.metrics().active_streams, 1);
    let sub2 = registry
      .subscribe(scope("a"), Some(0), || async {
        panic!("origin should have survived the linger window")
      })
      .await
      .unwrap();

    // The armed timer from the first detach must not fire now.
    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
    assert_eq!(registry.metrics().active_streams, 1);

    // Final detach, linger expires, origin torn down.
    sub2.close();
    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(registry.metrics().active_streams, 0);
    assert_eq!(registry.metrics().subscribers, 0);
    drop(tx);
  }

  #[tokio::test(start_paused = true)]
  async fn origin_end_reaches_subscribers() {
    let registry = registry(10, 8, 5);
    let (tx, stream) = feeder(16);
    let mut stream = Some(stream);

    let mut sub = registry
      .subscribe(scope("a"), Some(0), || async {
        Ok(stream.take().unwrap())
      })
      .await
      .unwrap();
    tx.send(Arc::from("frame-0")).await.unwrap();
    drop(tx);
    tokio::task::yield_now().await;

    assert_eq!(recv_frame(&mut sub).await, "frame-0");
    assert!(matches!(
      sub.next().await,
      StreamItem::End(EndReason::OriginClosed)
    ));
    tokio::task::yield_now().await;
    assert_eq!(registry.metrics().active_streams, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_factory_leaves_no_entry() {
    let registry = registry(10, 8, 5);
    let err = registry
      .subscribe(scope("a"), Some(0), || async {
        Err(OpError::msg(
          ErrorCode::DockerConnection,
          "daemon down",
        ))
      })
      .await
      .unwrap_err();
    assert_eq!(err.code, ErrorCode::DockerConnection);
    assert_eq!(registry.metrics().active_streams, 0);
  }

  #[test]
  fn fingerprints_differ_on_params() {
    let a = fingerprint(&[("follow", "true"), ("tail", "100")]);
    let b = fingerprint(&[("follow", "false"), ("tail", "100")]);
    assert_ne!(a, b);
    assert_eq!(
      a,
      fingerprint(&[("follow", "true"), ("tail", "100")])
    );
  }
}
