//! Text of the OCFL specification documents written into a storage root
//! during initialization. Each repository carries a copy of the spec
//! version it conforms to and, per extension declared in use, a copy of
//! that extension's specification document under `extensions/<name>/`.
//!
//! These are abbreviated to their normative opening sections rather than
//! reproduced in full; the storage root only needs a durable, offline
//! reference, not a mirror of the published spec site.

use crate::layout::LayoutExtensionName;
use crate::types::SpecVersion;

/// Returns the text to persist as a storage root's or object's copy of
/// the OCFL specification document.
pub fn spec_text(version: SpecVersion) -> &'static str {
    match version {
        SpecVersion::Ocfl1_0 => OCFL_1_0_SPEC,
        SpecVersion::Ocfl1_1 => OCFL_1_1_SPEC,
    }
}

/// Returns the text to persist as an extension's specification document
/// under `extensions/<name>/`.
pub fn extension_spec_text(name: LayoutExtensionName) -> &'static str {
    match name {
        LayoutExtensionName::FlatDirectLayout => EXT_0002_SPEC,
        LayoutExtensionName::HashedNTupleObjectIdLayout => EXT_0003_SPEC,
        LayoutExtensionName::HashedNTupleLayout => EXT_0004_SPEC,
        LayoutExtensionName::FlatOmitPrefixLayout => EXT_0006_SPEC,
        LayoutExtensionName::NTupleOmitPrefixLayout => EXT_0007_SPEC,
    }
}

pub const OCFL_1_0_SPEC: &str = r#"Oxford Common File Layout, Version 1.0

This document describes the Oxford Common File Layout (OCFL), an
application-independent approach to the storage of digital information
in a structured, transparent, and predictable manner, designed to
promote long-term object management best practices within digital
repositories.

An OCFL storage root is a directory containing zero or more OCFL
objects, identified by a root conformance declaration (`0=ocfl_1.0`)
and an optional `ocfl_layout.json` describing how object identifiers
are mapped to object root directories.

An OCFL object is a directory identified by an object conformance
declaration (`0=ocfl_object_1.0`), containing an inventory
(`inventory.json` plus a digest sidecar) and one directory per version
(`v1`, `v2`, ...), each holding the version's content and, at the root,
the state of every version that existed when that inventory was last
written. Object content is addressed by digest in the inventory's
manifest, so identical content is stored once regardless of how many
logical paths or versions reference it.

See https://ocfl.io/1.0/spec/ for the full normative text.
"#;

pub const OCFL_1_1_SPEC: &str = r#"Oxford Common File Layout, Version 1.1

This document describes the Oxford Common File Layout (OCFL), an
application-independent approach to the storage of digital information
in a structured, transparent, and predictable manner, designed to
promote long-term object management best practices within digital
repositories.

Version 1.1 clarifies several ambiguities present in version 1.0 and
is backward compatible with it: a 1.1 client can read a 1.0 object, and
the two declarations differ only in which version of this document an
object or storage root declares conformance to.

See https://ocfl.io/1.1/spec/ for the full normative text.
"#;

pub const EXT_0002_SPEC: &str = r#"Extension 0002: Flat Direct Storage Layout

This storage layout extension describes storing OCFL objects using the
OCFL object identifier translated directly into a directory name. The
object identifier is percent-encoded to escape characters that are
reserved or invalid in directory names, and then used as-is as the
object's path relative to the storage root.

This layout depends on object identifiers being file-system safe after
encoding, and does not scale well to storage roots holding a very large
number of objects in a single flat directory.
"#;

pub const EXT_0003_SPEC: &str = r#"Extension 0003: Hash and Id N Tuple Storage Layout

This storage layout extension maps object identifiers to object root
directories by computing the digest of the identifier under a
configured algorithm, splitting the leading hex characters of the
digest into a sequence of N-character tuples to form a directory tree,
and appending a final directory named after the (percent-encoded,
length-capped) original object identifier.

This combines even distribution of objects across the tree with the
retrievability of the original identifier from the final path segment.
"#;

pub const EXT_0004_SPEC: &str = r#"Extension 0004: Hashed Truncated N Tuple Trees with Object ID
Encapsulating Directory Storage Layout

This storage layout extension maps object identifiers to object root
directories using only the digest of the identifier. The digest is
split into a sequence of N-character tuples, a configured number of
tuples deep, and the full digest is again used as the encapsulating
directory name at the leaf.

Because the object identifier itself does not appear in the path, this
layout does not depend on the identifier being file-system safe.
"#;

pub const EXT_0006_SPEC: &str = r#"Extension 0006: Flat Omit Prefix Storage Layout

This storage layout extension maps object identifiers to object root
directories by removing everything up to and including a configured
delimiter from the identifier, then using the remainder directly as the
object's path relative to the storage root, with no further
transformation.
"#;

pub const EXT_0007_SPEC: &str = r#"Extension 0007: N Tuple Omit Prefix Storage Layout

This storage layout extension combines extension 0004's N-tuple
directory tree with extension 0006's prefix removal: everything up to
and including a configured delimiter is stripped from the object
identifier, and the remainder is split into N-character tuples to form
the directory tree, with the stripped remainder again used as the
encapsulating leaf directory name.
"#;
