use crate::peer::types::IceCandidate;

/// Кандидаты, найденные до того, как сессия готова их отправлять.
///
/// Хранит уже закодированные для канала сигнализации сообщения. Слив отдаёт
/// их в порядке обнаружения и полностью опустошает очередь.
#[derive(Debug, Default, Clone)]
pub struct CandidateQueue {
    pending: Vec<String>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, encoded: String) {
        self.pending.push(encoded);
    }

    /// Забирает все накопленные кандидаты (FIFO)
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.pending.iter()
    }
}

/// Тип кандидата по строке `typ ...` (host / srflx / relay)
pub fn candidate_kind(candidate: &IceCandidate) -> &'static str {
    if candidate.candidate.contains("typ host") {
        "host"
    } else if candidate.candidate.contains("typ srflx") {
        "srflx"
    } else if candidate.candidate.contains("typ relay") {
        "relay"
    } else if candidate.candidate.contains("typ prflx") {
        "prflx"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_discovery_order_and_empties() {
        let mut q = CandidateQueue::new();
        q.push("c1".into());
        q.push("c2".into());
        q.push("c3".into());
        assert_eq!(q.len(), 3);

        assert_eq!(q.drain(), vec!["c1", "c2", "c3"]);
        assert!(q.is_empty());
    }

    #[test]
    fn draining_empty_queue_yields_nothing() {
        let mut q = CandidateQueue::new();
        assert!(q.drain().is_empty());
        assert!(q.drain().is_empty());
    }

    #[test]
    fn kinds_are_detected() {
        let c = |s: &str| IceCandidate {
            candidate: s.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        };
        assert_eq!(candidate_kind(&c("candidate:1 1 udp 1 10.0.0.1 5000 typ host")), "host");
        assert_eq!(
            candidate_kind(&c("candidate:2 1 udp 1 1.2.3.4 5000 typ srflx raddr 0.0.0.0")),
            "srflx"
        );
        assert_eq!(candidate_kind(&c("candidate:3 1 udp 1 5.6.7.8 5000 typ relay")), "relay");
    }
}
