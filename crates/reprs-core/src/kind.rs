//! Representation kinds.
//!
//! Every representation of a datum is tagged with one [`ReprKind`]. The set is
//! closed: path search, validity bookkeeping and the converter table all index
//! by kind, so identity never depends on runtime type inspection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Backend-specific form of a datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReprKind {
    /// Lazily loaded data that still lives on disk.
    Disk,
    /// Host memory array.
    Ram,
    /// Graphics-resident object (texture or buffer).
    Graphics,
    /// Compute-resident buffer.
    Compute,
    /// Graphics object wrapped for zero-copy compute access.
    Interop,
}

impl ReprKind {
    /// All kinds in declaration order.
    pub const ALL: [ReprKind; 5] = [
        Self::Disk,
        Self::Ram,
        Self::Graphics,
        Self::Compute,
        Self::Interop,
    ];

    /// Number of kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Stable index in declaration order.
    #[inline]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Kind for a stable index.
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Ram => "ram",
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Interop => "interop",
        }
    }

    /// Whether the storage lives on a device rather than the host.
    pub const fn is_device(&self) -> bool {
        matches!(self, Self::Graphics | Self::Compute | Self::Interop)
    }
}

impl std::fmt::Display for ReprKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ReprKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "ram" | "host" => Ok(Self::Ram),
            "graphics" | "gl" | "gr" => Ok(Self::Graphics),
            "compute" | "cl" | "cr" => Ok(Self::Compute),
            "interop" | "clgl" | "shared" => Ok(Self::Interop),
            _ => Err(Error::InvalidArgument(format!("unknown representation kind '{s}'"))),
        }
    }
}

/// Set of kinds, iterated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KindSet(u8);

impl KindSet {
    /// Empty set.
    pub const EMPTY: Self = Self(0);

    /// Set containing every kind.
    pub const fn all() -> Self {
        Self((1 << ReprKind::COUNT) - 1)
    }

    /// Set with a single kind.
    pub const fn single(kind: ReprKind) -> Self {
        Self(1 << kind as u8)
    }

    /// Adds a kind.
    #[inline]
    pub fn insert(&mut self, kind: ReprKind) {
        self.0 |= 1 << kind.index();
    }

    /// Removes a kind.
    #[inline]
    pub fn remove(&mut self, kind: ReprKind) {
        self.0 &= !(1 << kind.index());
    }

    /// Membership test.
    #[inline]
    pub const fn contains(&self, kind: ReprKind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }

    /// Number of kinds in the set.
    #[inline]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the set is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = ReprKind> + '_ {
        ReprKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl FromIterator<ReprKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = ReprKind>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl std::fmt::Display for KindSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{kind}")?;
        }
        write!(f, "}}")
    }
}
