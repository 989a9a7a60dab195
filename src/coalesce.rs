//! Groups watcher diffs into stacked notifications.
//!
//! Successive scalar changes to one path while its notification is alive extend a single
//! chain (`hp 10→11→12→13`) instead of opening a notification per step. Every other change
//! kind gets its own line in a freshly opened notification. Time is passed in explicitly so
//! the host's clock drives dismissal.

use crate::diff::Change;
use crate::statics;
use crate::value::DcValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Quiescence after which an unpinned notification dismisses itself.
pub const NOTIFICATION_LIFETIME: Duration = Duration::from_secs(15);

const MAX_VALUE_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationLine {
    /// Every value a scalar path has taken, starting with the value before the first change.
    Chain { path: String, values: Vec<DcValue> },
    Single(Change),
}

impl NotificationLine {
    pub fn path(&self) -> &str {
        match self {
            NotificationLine::Chain { path, .. } => path,
            NotificationLine::Single(change) => change.path(),
        }
    }

    /// One-line human-readable form.
    pub fn render(&self) -> String {
        match self {
            NotificationLine::Chain { path, values } => {
                let chain: Vec<String> = values.iter().map(short).collect();
                format!("{path} {}", chain.join(statics::EN_ARROW))
            }
            NotificationLine::Single(change) => match change {
                Change::Added { path, value } => format!(
                    "{}{path}{}{}",
                    statics::EN_PREFIX_ADDED,
                    statics::EN_ASSIGN,
                    short(value)
                ),
                Change::Removed { path } => format!("{}{path}", statics::EN_PREFIX_REMOVED),
                Change::Scalar { path, old, new } => {
                    format!("{path} {}{}{}", short(old), statics::EN_ARROW, short(new))
                }
                Change::TypeChange {
                    path,
                    old,
                    old_type,
                    new,
                    new_type,
                } => format!(
                    "{path}: {} ({old_type}) {} {} ({new_type})",
                    short(old),
                    statics::EN_ARROW,
                    short(new)
                ),
                Change::ListAppend { path, item } => {
                    format!("{path}{}{}", statics::EN_LIST_APPEND, short(item))
                }
                Change::ListRemove { path, item } => {
                    format!("{path}{}{}", statics::EN_LIST_REMOVE, short(item))
                }
            },
        }
    }
}

fn short(value: &DcValue) -> String {
    let text = value.to_json_compact();
    if text.chars().count() <= MAX_VALUE_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_VALUE_CHARS).collect();
    cut.push('…');
    cut
}

#[derive(Debug, Clone)]
pub struct Notification {
    id: u64,
    lines: Vec<NotificationLine>,
    last_activity: Instant,
    timer_resets: u32,
    pinned: bool,
}

impl Notification {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn lines(&self) -> &[NotificationLine] {
        &self.lines
    }

    pub fn rendered_lines(&self) -> Vec<String> {
        self.lines.iter().map(NotificationLine::render).collect()
    }

    /// How many times later changes pushed the dismissal back.
    pub fn timer_resets(&self) -> u32 {
        self.timer_resets
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

#[derive(Debug)]
pub struct Coalescer {
    lifetime: Duration,
    notifications: Vec<Notification>,
    /// Open chain path -> id of the notification holding it.
    chains: HashMap<String, u64>,
    next_id: u64,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self::with_lifetime(NOTIFICATION_LIFETIME)
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            lifetime,
            notifications: Vec::new(),
            chains: HashMap::new(),
            next_id: 1,
        }
    }

    /// Live notifications, oldest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn notification(&self, id: u64) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Values of the open chain for `path`, if any.
    pub fn chain(&self, path: &str) -> Option<&[DcValue]> {
        let id = self.chains.get(path)?;
        self.notification(*id)?
            .lines
            .iter()
            .find_map(|line| match line {
                NotificationLine::Chain { path: p, values } if p == path => Some(values.as_slice()),
                _ => None,
            })
    }

    /// Feed one diff. Returns the ids of notifications that were opened or updated.
    pub fn ingest(&mut self, changes: &[Change], now: Instant) -> Vec<u64> {
        self.expire(now);

        let mut fresh: Option<usize> = None;
        let mut touched: Vec<u64> = Vec::new();

        for change in changes {
            if let Change::Scalar { path, old, new } = change {
                if let Some(&id) = self.chains.get(path) {
                    if let Some(n) = self.notifications.iter_mut().find(|n| n.id == id) {
                        for line in n.lines.iter_mut() {
                            if let NotificationLine::Chain { path: p, values } = line {
                                if p.as_str() == path.as_str() {
                                    values.push(new.clone());
                                }
                            }
                        }
                        n.last_activity = now;
                        if !touched.contains(&id) {
                            touched.push(id);
                        }
                        continue;
                    }
                }

                let idx = self.fresh_notification(&mut fresh, now);
                let id = self.notifications[idx].id;
                self.notifications[idx].lines.push(NotificationLine::Chain {
                    path: path.clone(),
                    values: vec![old.clone(), new.clone()],
                });
                self.chains.insert(path.clone(), id);
                continue;
            }

            let idx = self.fresh_notification(&mut fresh, now);
            self.notifications[idx]
                .lines
                .push(NotificationLine::Single(change.clone()));
        }

        let fresh_id = fresh.map(|idx| self.notifications[idx].id);
        for id in &touched {
            if Some(*id) == fresh_id {
                continue;
            }
            if let Some(n) = self.notifications.iter_mut().find(|n| n.id == *id) {
                n.timer_resets += 1;
            }
        }

        touched.retain(|id| Some(*id) != fresh_id);
        touched.extend(fresh_id);
        touched
    }

    fn fresh_notification(&mut self, fresh: &mut Option<usize>, now: Instant) -> usize {
        if let Some(idx) = *fresh {
            return idx;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.notifications.push(Notification {
            id,
            lines: Vec::new(),
            last_activity: now,
            timer_resets: 0,
            pinned: false,
        });
        let idx = self.notifications.len() - 1;
        *fresh = Some(idx);
        idx
    }

    /// Dismiss every unpinned notification idle for the full lifetime. Returns their ids.
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let expired: Vec<u64> = self
            .notifications
            .iter()
            .filter(|n| !n.pinned && now.saturating_duration_since(n.last_activity) >= self.lifetime)
            .map(|n| n.id)
            .collect();
        for id in &expired {
            self.dismiss(*id);
        }
        expired
    }

    /// Close a notification and end the chains it holds.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.chains.retain(|_, owner| *owner != id);
        self.notifications.len() != before
    }

    /// Freeze dismissal of a notification.
    pub fn pin(&mut self, id: u64) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.pinned = true;
                true
            }
            None => false,
        }
    }

    /// Unfreeze; the quiescence window restarts at `now`.
    pub fn unpin(&mut self, id: u64, now: Instant) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.pinned = false;
                n.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
        self.chains.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Coalescer, NOTIFICATION_LIFETIME, NotificationLine};
    use crate::diff::Change;
    use crate::value::DcValue;
    use std::time::{Duration, Instant};

    fn scalar(path: &str, old: i64, new: i64) -> Change {
        Change::Scalar {
            path: path.to_string(),
            old: DcValue::from(old),
            new: DcValue::from(new),
        }
    }

    #[test]
    fn non_scalar_changes_never_merge() {
        let mut c = Coalescer::new();
        let t0 = Instant::now();
        let removed = Change::Removed {
            path: "x".to_string(),
        };
        c.ingest(std::slice::from_ref(&removed), t0);
        c.ingest(std::slice::from_ref(&removed), t0 + Duration::from_secs(1));
        assert_eq!(c.notifications().len(), 2);
        assert_eq!(c.notifications()[1].rendered_lines(), vec!["- x"]);
    }

    #[test]
    fn one_diff_opens_one_notification() {
        let mut c = Coalescer::new();
        let ids = c.ingest(
            &[
                scalar("a", 1, 2),
                Change::ListAppend {
                    path: "sticker".to_string(),
                    item: DcValue::from(5),
                },
            ],
            Instant::now(),
        );
        assert_eq!(ids.len(), 1);
        let n = &c.notifications()[0];
        assert_eq!(n.rendered_lines(), vec!["a 1→2", "sticker += 5"]);
    }

    #[test]
    fn expired_chain_starts_over() {
        let mut c = Coalescer::new();
        let t0 = Instant::now();
        c.ingest(&[scalar("hp", 1, 2)], t0);
        c.ingest(&[scalar("hp", 2, 3)], t0 + NOTIFICATION_LIFETIME);
        assert_eq!(c.notifications().len(), 1);
        assert_eq!(
            c.chain("hp").unwrap(),
            &[DcValue::from(2), DcValue::from(3)]
        );
    }

    #[test]
    fn pinned_notifications_outlive_the_timer_and_keep_chaining() {
        let mut c = Coalescer::new();
        let t0 = Instant::now();
        let id = c.ingest(&[scalar("hp", 1, 2)], t0)[0];
        assert!(c.pin(id));
        let later = t0 + NOTIFICATION_LIFETIME * 3;
        assert!(c.expire(later).is_empty());
        c.ingest(&[scalar("hp", 2, 3)], later);
        assert_eq!(c.chain("hp").unwrap().len(), 3);

        c.unpin(id, later);
        assert_eq!(c.expire(later + NOTIFICATION_LIFETIME), vec![id]);
        assert!(c.chain("hp").is_none());
    }

    #[test]
    fn dismiss_removes_chain() {
        let mut c = Coalescer::new();
        let id = c.ingest(&[scalar("mp", 0, 1)], Instant::now())[0];
        assert!(c.dismiss(id));
        assert!(c.notifications().is_empty());
        assert!(c.chain("mp").is_none());
    }

    #[test]
    fn long_values_are_shortened_when_rendered() {
        let line = NotificationLine::Single(Change::Added {
            path: "blob".to_string(),
            value: DcValue::from("x".repeat(200)),
        });
        let text = line.render();
        assert!(text.starts_with("+ blob = \"xxx"));
        assert!(text.ends_with('…'));
    }
}
