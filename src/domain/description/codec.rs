/// Textual SDP codec port
use crate::domain::description::media::SessionDescription;
use crate::domain::shared::Result;

/// Output of parsing a textual description
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSdp {
    pub description: SessionDescription,
    pub session_id: String,
    pub session_version: String,
}

/// Converts between SDP text and structured descriptions.
///
/// Every parse returns a freshly owned description.
pub trait SdpCodec: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedSdp>;

    fn serialize(
        &self,
        description: &SessionDescription,
        session_id: &str,
        session_version: &str,
    ) -> String;
}
