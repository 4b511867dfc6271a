//! Ordered catalog of carriers, lowest-priority first. Mirrors
//! `original_source/transport/manager.go`: `polling` precedes `websocket`,
//! and `CanUpgrade` forbids moving backwards through the list.

use super::TransportType;

const ORDER: [TransportType; 2] = [TransportType::Polling, TransportType::Websocket];

#[derive(Debug, Clone, Copy, Default)]
pub struct TransportManager;

impl TransportManager {
    /// Transports strictly after `name` in priority order: polling
    /// advertises `["websocket"]`, websocket advertises `[]`.
    pub fn upgradable(&self, name: TransportType) -> Vec<TransportType> {
        match ORDER.iter().position(|&t| t == name) {
            Some(idx) => ORDER[idx + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    /// True iff `to` appears strictly after `from` in the priority order.
    /// Downgrades (and same-transport "upgrades") are forbidden.
    pub fn can_upgrade(&self, from: TransportType, to: TransportType) -> bool {
        for &t in ORDER.iter() {
            if t == from {
                break;
            }
            if t == to {
                return false;
            }
        }
        self.upgradable(from).contains(&to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_can_upgrade_to_websocket() {
        let m = TransportManager::default();
        assert!(m.can_upgrade(TransportType::Polling, TransportType::Websocket));
        assert_eq!(
            m.upgradable(TransportType::Polling),
            vec![TransportType::Websocket]
        );
    }

    #[test]
    fn websocket_has_no_further_upgrades() {
        let m = TransportManager::default();
        assert!(m.upgradable(TransportType::Websocket).is_empty());
        assert!(!m.can_upgrade(TransportType::Websocket, TransportType::Polling));
    }
}
