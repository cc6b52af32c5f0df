// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tunables for assemblers and publishers.

/// Options for an [`EventAssembler`](crate::EventAssembler).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AssemblerOptions {
    /// Record old and new values with every edit. When off, blocks only split on kind and
    /// contiguity and listeners see no values.
    pub track_values: bool,
    /// Try the run-length log before the tree for every atomic operation.
    pub fast_path: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            track_values: true,
            fast_path: true,
        }
    }
}

impl AssemblerOptions {
    #[must_use]
    pub fn with_track_values(mut self, track_values: bool) -> Self {
        self.track_values = track_values;
        self
    }

    #[must_use]
    pub fn with_fast_path(mut self, fast_path: bool) -> Self {
        self.fast_path = fast_path;
        self
    }
}

/// Options for an [`EventPublisher`](crate::EventPublisher).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PublisherOptions {
    /// Report removal of a listener that was never added as
    /// [`PublisherError::UnknownListener`](crate::PublisherError::UnknownListener) instead of
    /// ignoring it.
    pub strict_listener_removal: bool,
}

impl PublisherOptions {
    #[must_use]
    pub fn with_strict_listener_removal(mut self, strict: bool) -> Self {
        self.strict_listener_removal = strict;
        self
    }
}
