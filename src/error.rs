// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IO error"), context(false))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("IO error on {}", path.display()))]
    IoAt {
        source: std::io::Error,
        path:   PathBuf,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Queue is shut down"))]
    Shutdown {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Unrecognized queue file name: {name}"))]
    InvalidFileName {
        name: String,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    #[snafu(display("{message}"))]
    Internal {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },
}

impl Error {
    /// True when the underlying IO failure was a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io { source, .. } | Error::IoAt { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
