use std::{collections::VecDeque, sync::Arc};

/// Fixed-capacity newest-wins frame buffer, replayed to
/// subscribers on attach.
#[derive(Debug)]
pub struct FrameRing {
  buf: VecDeque<Arc<str>>,
  capacity: usize,
}

impl FrameRing {
  pub fn new(capacity: usize) -> FrameRing {
    FrameRing {
      buf: VecDeque::with_capacity(capacity.min(1_024)),
      capacity,
    }
  }

  /// At capacity the oldest frame is dropped, never the newest.
  pub fn push(&mut self, frame: Arc<str>) {
    if self.capacity == 0 {
      return;
    }
    if self.buf.len() == self.capacity {
      self.buf.pop_front();
    }
    self.buf.push_back(frame);
  }

  /// Most recent `tail` frames in origin order. `None` replays
  /// the full ring, `Some(0)` replays nothing.
  pub fn tail(&self, tail: Option<usize>) -> Vec<Arc<str>> {
    let take = tail.unwrap_or(self.buf.len()).min(self.buf.len());
    self
      .buf
      .iter()
      .skip(self.buf.len() - take)
      .cloned()
      .collect()
  }

  pub fn len(&self) -> usize {
    self.buf.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame(n: usize) -> Arc<str> {
    Arc::from(format!("frame-{n}").as_str())
  }

  #[test]
  fn drops_oldest_at_capacity() {
    let mut ring = FrameRing::new(3);
    for n in 0..5 {
      ring.push(frame(n));
    }
    assert_eq!(ring.len(), 3);
    let frames = ring.tail(None);
    assert_eq!(
      frames.iter().map(|f| f.as_ref()).collect::<Vec<_>>(),
      vec!["frame-2", "frame-3", "frame-4"]
    );
  }

  #[test]
  fn tail_zero_replays_nothing() {
    let mut ring = FrameRing::new(3);
    ring.push(frame(0));
    assert!(ring.tail(Some(0)).is_empty());
  }

  #[test]
  fn tail_clamps_to_available() {
    let mut ring = FrameRing::new(10);
    ring.push(frame(0));
    ring.push(frame(1));
    assert_eq!(ring.tail(Some(100)).len(), 2);
    assert_eq!(ring.tail(Some(1))[0].as_ref(), "frame-1");
  }
}
