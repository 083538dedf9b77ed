//! Session description document
//!
//! A structured description plus one candidate collection per media
//! section. Everything except the candidate collections is fixed at
//! construction; collections only grow.

use crate::domain::description::candidate::{Candidate, CandidateCollection};
use crate::domain::description::codec::SdpCodec;
use crate::domain::description::media::{SdpType, SessionDescription};
use crate::domain::shared::{Result, SignalingError};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescriptionDocument {
    description: SessionDescription,
    session_id: String,
    session_version: String,
    sdp_type: SdpType,
    /// Same length and index correspondence as `description.contents`
    candidate_collections: Vec<CandidateCollection>,
}

impl SessionDescriptionDocument {
    /// Build a document from a structured description.
    ///
    /// Candidates carried inline in the media sections are moved into the
    /// document's collections.
    pub fn new(
        mut description: SessionDescription,
        session_id: impl Into<String>,
        session_version: impl Into<String>,
        sdp_type: SdpType,
    ) -> Self {
        let candidate_collections = description
            .contents
            .iter_mut()
            .map(|content| {
                let mut collection = CandidateCollection::new();
                for candidate in content.description.candidates.drain(..) {
                    collection.add(candidate);
                }
                collection
            })
            .collect();

        Self {
            description,
            session_id: session_id.into(),
            session_version: session_version.into(),
            sdp_type,
            candidate_collections,
        }
    }

    /// Build a document from SDP text; ids come from the origin line
    pub fn from_sdp(text: &str, sdp_type: SdpType, codec: &dyn SdpCodec) -> Result<Self> {
        let parsed = codec.parse(text)?;
        Ok(Self::new(
            parsed.description,
            parsed.session_id,
            parsed.session_version,
            sdp_type,
        ))
    }

    pub fn description(&self) -> &SessionDescription {
        &self.description
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_version(&self) -> &str {
        &self.session_version
    }

    pub fn sdp_type(&self) -> SdpType {
        self.sdp_type
    }

    pub fn number_of_media_sections(&self) -> usize {
        self.candidate_collections.len()
    }

    pub fn candidates(&self, media_section_index: usize) -> Option<&CandidateCollection> {
        self.candidate_collections.get(media_section_index)
    }

    /// Total candidates across every media section
    pub fn candidate_count(&self) -> usize {
        self.candidate_collections.iter().map(|c| c.len()).sum()
    }

    /// Append a candidate to the collection of one media section.
    ///
    /// An index past the last section fails and leaves the document as it was.
    pub fn add_candidate(&mut self, media_section_index: usize, candidate: Candidate) -> Result<()> {
        let count = self.candidate_collections.len();
        let collection = self
            .candidate_collections
            .get_mut(media_section_index)
            .ok_or(SignalingError::MediaSectionOutOfRange {
                index: media_section_index,
                count,
            })?;

        collection.add(candidate);
        Ok(())
    }

    /// Serialize, writing each section's candidates back inline
    pub fn to_sdp(&self, codec: &dyn SdpCodec) -> String {
        let mut description = self.description.clone();
        for (content, collection) in description
            .contents
            .iter_mut()
            .zip(self.candidate_collections.iter())
        {
            content.description.candidates.extend(collection.iter().cloned());
        }

        codec.serialize(&description, &self.session_id, &self.session_version)
    }
}
