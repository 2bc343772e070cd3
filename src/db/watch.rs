//! Watch: кольцо событий фиксированной ёмкости + поток доставки.
//!
//! push всегда успешен: при заполнении кольца затирается самое старое
//! событие (живость писателя важнее полноты истории). Поток доставки
//! опрашивает кольцо и пересылает события в ограниченный канал подписчика;
//! доставка best-effort, at-most-once на слот.

use crossbeam_channel::{SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::metrics::record_watch_event_dropped;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Put,
    Delete,
}

/// Эффект одной записи, применённый к индексу при коммите.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub action: WatchAction,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub batch_id: u64,
}

struct EventQueue {
    events: Vec<Option<Event>>,
    capacity: usize,
    front: usize, // read point
    back: usize,  // write point
}

impl EventQueue {
    fn push(&mut self, e: Event) {
        self.events[self.back] = Some(e);
        self.back = (self.back + 1) % self.capacity;
    }

    fn pop(&mut self) -> Option<Event> {
        if self.is_empty() {
            return None;
        }
        let e = self.events[self.front].take();
        self.front_take_a_step();
        e
    }

    fn front_take_a_step(&mut self) {
        self.front = (self.front + 1) % self.capacity;
    }

    fn is_full(&self) -> bool {
        (self.back + 1) % self.capacity == self.front
    }

    fn is_empty(&self) -> bool {
        self.back == self.front
    }
}

pub struct Watcher {
    queue: Mutex<EventQueue>,
}

impl Watcher {
    /// Кольцо ёмкости `capacity` хранит не более capacity-1 событий.
    pub fn new(capacity: usize) -> Watcher {
        assert!(capacity >= 2, "watch queue capacity must be at least 2");
        Watcher {
            queue: Mutex::new(EventQueue {
                events: std::iter::repeat_with(|| None).take(capacity).collect(),
                capacity,
                front: 0,
                back: 0,
            }),
        }
    }

    pub fn put_event(&self, e: Event) {
        let mut q = self.queue.lock().unwrap();
        // полное кольцо: самое старое событие затирается, писатель не ждёт
        if q.is_full() {
            q.front_take_a_step();
            record_watch_event_dropped();
        }
        q.push(e);
    }

    /// None, если кольцо пусто.
    pub fn get_event(&self) -> Option<Event> {
        self.queue.lock().unwrap().pop()
    }
}

/// Поток доставки: опрос кольца каждые 100 мс, пересылка в канал подписчика.
/// Останавливается по `shutdown` или отключению получателя.
pub(crate) fn start_delivery(
    watcher: Arc<Watcher>,
    sender: Sender<Event>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("kestrel-watch".to_string())
        .spawn(move || loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            match watcher.get_event() {
                None => std::thread::sleep(Duration::from_millis(100)),
                Some(event) => {
                    let mut event = event;
                    loop {
                        match sender.send_timeout(event, Duration::from_millis(100)) {
                            Ok(()) => break,
                            Err(SendTimeoutError::Timeout(e)) => {
                                if shutdown.load(Ordering::Acquire) {
                                    return;
                                }
                                event = e;
                            }
                            Err(SendTimeoutError::Disconnected(_)) => return,
                        }
                    }
                }
            }
        })
        .expect("failed to spawn watch delivery thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(i: u8) -> Event {
        Event {
            action: WatchAction::Put,
            key: vec![i],
            value: vec![i, i],
            batch_id: i as u64,
        }
    }

    #[test]
    fn queue_pops_in_fifo_order() {
        let w = Watcher::new(8);
        for i in 0..3 {
            w.put_event(event(i));
        }
        assert_eq!(w.get_event().unwrap().key, vec![0]);
        assert_eq!(w.get_event().unwrap().key, vec![1]);
        assert_eq!(w.get_event().unwrap().key, vec![2]);
        assert!(w.get_event().is_none());
    }

    #[test]
    fn overflow_drops_oldest_keeping_capacity_minus_one() {
        let capacity = 5usize;
        let w = Watcher::new(capacity);
        for i in 0..10u8 {
            w.put_event(event(i));
        }
        let mut kept = Vec::new();
        while let Some(e) = w.get_event() {
            kept.push(e.key[0]);
        }
        assert_eq!(kept, vec![6, 7, 8, 9]);
        assert_eq!(kept.len(), capacity - 1);
    }
}
