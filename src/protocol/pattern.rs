//! Convenience detectors
//!
//! Building blocks for protocols that can be recognised by a fixed prefix or
//! a small scoring closure.

use std::sync::Arc;

use crate::common::Direction;
use crate::stream::FlowInfo;

use super::detector::{HandlerFactory, ProtocolDetector, ProtocolHandler};

/// Confidence reported by [`PatternDetector`] on an exact prefix match
pub const PATTERN_CONFIDENCE: u8 = 95;

/// Direction-sensitive byte-prefix detector
///
/// Scores [`PATTERN_CONFIDENCE`] when the buffer starts with the pattern for
/// its direction and 0 otherwise. An empty pattern disables matching in that
/// direction.
pub struct PatternDetector {
    name: String,
    client_pattern: Vec<u8>,
    server_pattern: Vec<u8>,
    factory: HandlerFactory,
}

impl PatternDetector {
    pub fn new<F>(name: &str, client_pattern: &[u8], server_pattern: &[u8], factory: F) -> Self
    where
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            client_pattern: client_pattern.to_vec(),
            server_pattern: server_pattern.to_vec(),
            factory: Arc::new(factory),
        }
    }

    /// Same pattern in both directions
    pub fn prefix<F>(name: &str, pattern: &[u8], factory: F) -> Self
    where
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        Self::new(name, pattern, pattern, factory)
    }

    fn pattern_for(&self, direction: Direction) -> &[u8] {
        match direction {
            Direction::ClientToServer => &self.client_pattern,
            Direction::ServerToClient => &self.server_pattern,
        }
    }
}

impl ProtocolDetector for PatternDetector {
    fn detect(&self, data: &[u8], direction: Direction) -> u8 {
        let pattern = self.pattern_for(direction);
        if pattern.is_empty() || data.len() < pattern.len() {
            return 0;
        }
        if data.starts_with(pattern) {
            PATTERN_CONFIDENCE
        } else {
            0
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn create_handler(&self, flow: &FlowInfo) -> Box<dyn ProtocolHandler> {
        (self.factory)(flow)
    }
}

type DetectFn = Arc<dyn Fn(&[u8], Direction) -> u8 + Send + Sync>;

/// Detector assembled from a scoring closure and a handler factory
pub struct FnDetector {
    name: String,
    detect: DetectFn,
    factory: HandlerFactory,
}

impl FnDetector {
    pub fn new<D, F>(name: &str, detect: D, factory: F) -> Self
    where
        D: Fn(&[u8], Direction) -> u8 + Send + Sync + 'static,
        F: Fn(&FlowInfo) -> Box<dyn ProtocolHandler> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            detect: Arc::new(detect),
            factory: Arc::new(factory),
        }
    }
}

impl ProtocolDetector for FnDetector {
    fn detect(&self, data: &[u8], direction: Direction) -> u8 {
        (self.detect)(data, direction)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn create_handler(&self, flow: &FlowInfo) -> Box<dyn ProtocolHandler> {
        (self.factory)(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Result;

    struct Named(String);

    impl ProtocolHandler for Named {
        fn on_data(&mut self, _: &[u8], _: Direction, _: bool, _: bool) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn protocol_name(&self) -> &str {
            &self.0
        }
    }

    fn echo() -> PatternDetector {
        PatternDetector::new("Echo", b"ECHO:", b"", |_| Box::new(Named("Echo".into())))
    }

    #[test]
    fn test_client_pattern_match() {
        let detector = echo();
        assert_eq!(detector.detect(b"ECHO:hi", Direction::ClientToServer), PATTERN_CONFIDENCE);
        assert_eq!(detector.detect(b"ECHO:", Direction::ClientToServer), PATTERN_CONFIDENCE);
    }

    #[test]
    fn test_short_or_mismatched_input_scores_zero() {
        let detector = echo();
        assert_eq!(detector.detect(b"ECHO", Direction::ClientToServer), 0);
        assert_eq!(detector.detect(b"echo:hi", Direction::ClientToServer), 0);
        assert_eq!(detector.detect(b"", Direction::ClientToServer), 0);
    }

    #[test]
    fn test_empty_pattern_never_matches_direction() {
        let detector = echo();
        assert_eq!(detector.detect(b"ECHO:hi", Direction::ServerToClient), 0);
        assert_eq!(detector.detect(b"", Direction::ServerToClient), 0);
    }

    #[test]
    fn test_server_pattern() {
        let detector = PatternDetector::new("SSH", b"SSH-", b"SSH-", |_| Box::new(Named("SSH".into())));
        assert_eq!(detector.detect(b"SSH-2.0-OpenSSH_9.6\r\n", Direction::ServerToClient), PATTERN_CONFIDENCE);

        let smtp = PatternDetector::new("SMTP", b"", b"220 ", |_| Box::new(Named("SMTP".into())));
        assert_eq!(smtp.detect(b"220 mail.example.com ESMTP", Direction::ServerToClient), PATTERN_CONFIDENCE);
        assert_eq!(smtp.detect(b"220 mail.example.com ESMTP", Direction::ClientToServer), 0);
    }

    #[test]
    fn test_prefix_matches_both_directions() {
        let detector = PatternDetector::prefix("Test", b"TEST", |_| Box::new(Named("Test".into())));
        assert_eq!(detector.detect(b"TEST data", Direction::ClientToServer), PATTERN_CONFIDENCE);
        assert_eq!(detector.detect(b"TEST data", Direction::ServerToClient), PATTERN_CONFIDENCE);
    }

    #[test]
    fn test_fn_detector() {
        let detector = FnDetector::new(
            "Binary",
            |data, dir| if dir == Direction::ClientToServer && data.first() == Some(&0xff) { 70 } else { 10 },
            |flow| Box::new(Named(format!("Binary {}", flow.ident))),
        );
        assert_eq!(detector.name(), "Binary");
        assert_eq!(detector.detect(&[0xff, 0x00], Direction::ClientToServer), 70);
        assert_eq!(detector.detect(&[0xff, 0x00], Direction::ServerToClient), 10);

        let flow = FlowInfo::new("10.0.0.1:1000".parse().unwrap(), "10.0.0.2:9".parse().unwrap());
        let handler = detector.create_handler(&flow);
        assert_eq!(handler.protocol_name(), "Binary 10.0.0.1:1000 - 10.0.0.2:9");
    }
}
