//! Binary subtree format (3D Tiles implicit tiling).
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic            u32   0x74627573 ("subt")
//! version          u32   1
//! json_length      u64   padded length of the JSON chunk
//! binary_length    u64   padded length of the binary chunk
//! json             [u8]  UTF-8, padded with spaces to a multiple of 8
//! binary           [u8]  packed bitstreams, padded with zeros to a multiple of 8
//! ```
//!
//! Each availability is written as `{"constant": 0}` when empty,
//! `{"constant": 1}` when full, and otherwise as
//! `{"bitstream": i, "availableCount": n}` pointing at buffer view `i`.
//! Buffer views are assigned in the order tile, content, child subtree.
//!
//! `contentAvailability` is always written as a one-element array. Decoding
//! also accepts a bare object, or no field at all (nothing has content).

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, MAX_SUBTREE_LEVELS};
use super::availability::{pyramid_length, Availability, Shape, Topology};
use super::bitset::Bitset;
use super::tree::Subtree;

/// "subt" read as a little-endian u32.
pub const SUBTREE_MAGIC: u32 = 0x7462_7573;
pub const SUBTREE_VERSION: u32 = 1;
pub const HEADER_LENGTH: usize = 24;

const JSON_PADDING: u8 = 0x20;
const BINARY_PADDING: u8 = 0x00;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubtreeJson {
    #[serde(default)]
    buffers: Vec<BufferJson>,
    #[serde(default)]
    buffer_views: Vec<BufferViewJson>,
    tile_availability: AvailabilityJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_availability: Option<ContentAvailabilityJson>,
    child_subtree_availability: AvailabilityJson,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BufferJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    byte_length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BufferViewJson {
    buffer: usize,
    byte_offset: usize,
    byte_length: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bitstream: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    available_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    constant: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentAvailabilityJson {
    Array(Vec<AvailabilityJson>),
    Object(AvailabilityJson),
}

/// Fixed 24-byte header of a subtree file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubtreeHeader {
    pub magic: u32,
    pub version: u32,
    pub json_length: u64,
    pub binary_length: u64,
}

impl SubtreeHeader {
    /// Parse and check the header at the start of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LENGTH {
            return Err(Error::format(format!(
                "subtree is {} bytes, shorter than its {}-byte header",
                bytes.len(),
                HEADER_LENGTH
            )));
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };

        let header = Self {
            magic: u32_at(0),
            version: u32_at(4),
            json_length: u64_at(8),
            binary_length: u64_at(16),
        };
        if header.magic != SUBTREE_MAGIC {
            return Err(Error::format(format!("bad magic 0x{:08x}", header.magic)));
        }
        if header.version != SUBTREE_VERSION {
            return Err(Error::format(format!("unsupported version {}", header.version)));
        }
        Ok(header)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.json_length.to_le_bytes());
        out.extend_from_slice(&self.binary_length.to_le_bytes());
    }
}

fn padding_for(len: usize) -> usize {
    (8 - len % 8) % 8
}

/// Collects bitstreams into the binary chunk and hands out buffer view indices.
#[derive(Default)]
struct BufferBuilder {
    data: Vec<u8>,
    views: Vec<BufferViewJson>,
}

impl BufferBuilder {
    /// `availableCount` is the number of set bits across the whole bitstream.
    fn describe(&mut self, availability: &Availability) -> AvailabilityJson {
        match availability.shape() {
            Shape::Empty => AvailabilityJson { constant: Some(0), ..Default::default() },
            Shape::Full => AvailabilityJson { constant: Some(1), ..Default::default() },
            Shape::Bitstream(bits) => {
                let packed = bits.to_bytes();
                let index = self.views.len();
                self.views.push(BufferViewJson {
                    buffer: 0,
                    byte_offset: self.data.len(),
                    byte_length: packed.len(),
                });
                self.data.extend_from_slice(&packed);
                AvailabilityJson {
                    bitstream: Some(index),
                    available_count: Some(bits.count_ones()),
                    constant: None,
                }
            }
        }
    }
}

/// Serialize a subtree to the binary subtree format.
pub fn encode(subtree: &Subtree) -> Result<Vec<u8>> {
    let mut buffer = BufferBuilder::default();
    let tile_availability = buffer.describe(subtree.tile_availability());
    let content_availability = buffer.describe(subtree.content_availability());
    let child_subtree_availability = buffer.describe(subtree.child_subtree_availability());

    let binary_padding = padding_for(buffer.data.len());
    let json = SubtreeJson {
        buffers: vec![BufferJson {
            name: None,
            byte_length: buffer.data.len() + binary_padding,
        }],
        buffer_views: buffer.views,
        tile_availability,
        content_availability: Some(ContentAvailabilityJson::Array(vec![content_availability])),
        child_subtree_availability,
    };
    let json_bytes = serde_json::to_vec(&json)
        .map_err(|e| Error::format(format!("failed to serialize subtree JSON: {}", e)))?;
    let json_padding = padding_for(json_bytes.len());

    let header = SubtreeHeader {
        magic: SUBTREE_MAGIC,
        version: SUBTREE_VERSION,
        json_length: (json_bytes.len() + json_padding) as u64,
        binary_length: (buffer.data.len() + binary_padding) as u64,
    };

    let mut out = Vec::with_capacity(
        HEADER_LENGTH + json_bytes.len() + json_padding + buffer.data.len() + binary_padding,
    );
    header.write(&mut out);
    out.extend_from_slice(&json_bytes);
    out.resize(out.len() + json_padding, JSON_PADDING);
    out.extend_from_slice(&buffer.data);
    out.resize(out.len() + binary_padding, BINARY_PADDING);
    Ok(out)
}

/// Split a subtree file into its JSON and binary chunks.
fn split_chunks(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let header = SubtreeHeader::read(bytes)?;
    let json_length = usize::try_from(header.json_length)
        .map_err(|_| Error::format("JSON length does not fit in memory"))?;
    let binary_length = usize::try_from(header.binary_length)
        .map_err(|_| Error::format("binary length does not fit in memory"))?;

    let json_end = HEADER_LENGTH
        .checked_add(json_length)
        .ok_or_else(|| Error::format("JSON length overflows"))?;
    let binary_end = json_end
        .checked_add(binary_length)
        .ok_or_else(|| Error::format("binary length overflows"))?;
    if binary_end > bytes.len() {
        return Err(Error::format(format!(
            "header declares {} bytes but subtree has {}",
            binary_end,
            bytes.len()
        )));
    }
    Ok((&bytes[HEADER_LENGTH..json_end], &bytes[json_end..binary_end]))
}

struct AvailabilityReader<'a> {
    json: &'a SubtreeJson,
    binary: &'a [u8],
}

impl AvailabilityReader<'_> {
    fn read(&self, entry: &AvailabilityJson, length: usize, topology: Topology) -> Result<Availability> {
        let bits = match (entry.bitstream, entry.constant) {
            (Some(view_index), _) => self.bitstream(view_index, length)?,
            (None, Some(0)) => Bitset::new(length),
            (None, Some(1)) => Bitset::full(length),
            (None, Some(other)) => {
                return Err(Error::format(format!("invalid availability constant {}", other)));
            }
            (None, None) => {
                return Err(Error::format("availability has neither constant nor bitstream"));
            }
        };
        Availability::from_bitset(&bits, length, topology)
    }

    fn bitstream(&self, view_index: usize, length: usize) -> Result<Bitset> {
        let view = self.json.buffer_views.get(view_index).ok_or_else(|| {
            Error::format(format!(
                "bufferView {} out of range ({} views)",
                view_index,
                self.json.buffer_views.len()
            ))
        })?;
        let buffer = self.json.buffers.get(view.buffer).ok_or_else(|| {
            Error::format(format!("buffer {} out of range", view.buffer))
        })?;
        if view.buffer != 0 {
            return Err(Error::format("external buffers are not supported"));
        }
        let end = view
            .byte_offset
            .checked_add(view.byte_length)
            .ok_or_else(|| Error::format("bufferView range overflows"))?;
        if end > buffer.byte_length || end > self.binary.len() {
            return Err(Error::format(format!(
                "bufferView {} ends at byte {} past the {}-byte buffer",
                view_index,
                end,
                self.binary.len().min(buffer.byte_length)
            )));
        }
        Bitset::from_bytes(&self.binary[view.byte_offset..end], length).ok_or_else(|| {
            Error::format(format!(
                "bufferView {} holds {} bytes, too short for {} bits",
                view_index, view.byte_length, length
            ))
        })
    }
}

/// Parse a subtree file describing `levels` quadtree levels.
///
/// The level count is a tileset property and is not stored in the file.
pub fn decode(bytes: &[u8], levels: usize) -> Result<Subtree> {
    if levels == 0 || levels > MAX_SUBTREE_LEVELS as usize {
        return Err(Error::precondition(format!(
            "cannot decode a subtree of {} levels",
            levels
        )));
    }
    let (json_chunk, binary) = split_chunks(bytes)?;
    let json: SubtreeJson = serde_json::from_slice(json_chunk)
        .map_err(|e| Error::format(format!("invalid subtree JSON: {}", e)))?;

    let reader = AvailabilityReader { json: &json, binary };
    let tile_length = pyramid_length(levels);
    let child_length = 1usize << (2 * levels);

    let tile_availability = reader.read(&json.tile_availability, tile_length, Topology::Pyramid)?;
    let content_entry = match &json.content_availability {
        Some(ContentAvailabilityJson::Object(entry)) => Some(entry),
        Some(ContentAvailabilityJson::Array(entries)) => entries.first(),
        None => None,
    };
    let content_availability = match content_entry {
        Some(entry) => reader.read(entry, tile_length, Topology::Pyramid)?,
        None => Availability::empty(levels, Topology::Pyramid),
    };
    let child_subtree_availability =
        reader.read(&json.child_subtree_availability, child_length, Topology::Children)?;

    Subtree::new(tile_availability, content_availability, child_subtree_availability, levels)
}
