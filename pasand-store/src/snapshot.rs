// SPDX-License-Identifier: AGPL-3.0-or-later
// PasandDB - In-Memory Personalized Ranking Engine
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Durable Snapshot Stream
//!
//! A generation serializes to one sequential LittleEndian stream. The
//! ordering contract is the correctness-relevant part:
//!
//! ```text
//! magic + version
//! product id map          (externals in dense-index order)
//! dictionary globals      (slot order; code order within a slot)
//! product list            (nullable entries; each attribute nullable)
//! consumer id map
//! consumer list           (with full event logs)
//! per event type          (last_event_id, last_event_ts), declared order
//! ```
//!
//! Globals land before any attribute value that references them, so the
//! decoder can resolve codes as it goes. Event type descriptors themselves
//! come from configuration; only their watermarks travel in the stream.
//!
//! Decode failures surface as [`PasandError::Snapshot`] or
//! [`PasandError::Corruption`], never as a panic.

use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pasand_core::{AttributeValue, Domain, DomainSchema, PasandError, Result, ValueDictionary};

use crate::entity::{Consumer, IdMap, Product};
use crate::event_log::{EventLog, MetadataColumn};
use crate::event_type::EventTypeDescriptor;
use crate::generation::{Generation, GenerationParts};

/// Stream magic: "PSDB"
const SNAPSHOT_MAGIC: u32 = 0x5053_4442;
/// Current stream format version
const FORMAT_VERSION: u16 = 1;
/// Upper bound on any length field, as a corruption tripwire
const MAX_LEN: u32 = 1 << 28;

// =============================================================================
// Write path
// =============================================================================

/// Serialize a generation to a sequential snapshot stream.
pub fn write_snapshot<W: Write>(generation: &Generation, w: &mut W) -> Result<()> {
    w.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
    w.write_u16::<LittleEndian>(FORMAT_VERSION)?;

    write_id_map(w, &generation.product_ids)?;

    let dictionaries = generation.domain.dictionaries();
    w.write_u16::<LittleEndian>(dictionaries.len() as u16)?;
    for dictionary in dictionaries {
        w.write_u32::<LittleEndian>((dictionary.len() - 1) as u32)?;
        for (_, value) in dictionary.iter() {
            write_string(w, value)?;
        }
    }

    w.write_u32::<LittleEndian>(generation.products.len() as u32)?;
    for product in &generation.products {
        match product {
            None => w.write_u8(0)?,
            Some(product) => {
                w.write_u8(1)?;
                w.write_i64::<LittleEndian>(product.external_id)?;
                write_string(w, &product.public_id)?;
                w.write_u8(product.kind)?;
                w.write_u64::<LittleEndian>(product.frequency)?;
                w.write_u16::<LittleEndian>(product.attributes.len() as u16)?;
                for attribute in &product.attributes {
                    write_attribute(w, attribute.as_ref())?;
                }
            }
        }
    }

    write_id_map(w, &generation.consumer_ids)?;

    w.write_u32::<LittleEndian>(generation.consumers.len() as u32)?;
    for consumer in &generation.consumers {
        w.write_i64::<LittleEndian>(consumer.external_id)?;
        w.write_u16::<LittleEndian>(consumer.logs.len() as u16)?;
        for log in &consumer.logs {
            write_log(w, log)?;
        }
    }

    w.write_u16::<LittleEndian>(generation.event_types.len() as u16)?;
    for descriptor in generation.event_types.iter() {
        w.write_i64::<LittleEndian>(descriptor.last_event_id)?;
        w.write_i64::<LittleEndian>(descriptor.last_event_ts)?;
    }

    Ok(())
}

fn write_id_map<W: Write>(w: &mut W, map: &IdMap) -> Result<()> {
    w.write_u32::<LittleEndian>(map.len() as u32)?;
    for &external in map.externals() {
        w.write_i64::<LittleEndian>(external)?;
    }
    Ok(())
}

fn write_string<W: Write>(w: &mut W, value: &str) -> Result<()> {
    w.write_u32::<LittleEndian>(value.len() as u32)?;
    w.write_all(value.as_bytes())?;
    Ok(())
}

fn write_attribute<W: Write>(w: &mut W, attribute: Option<&AttributeValue>) -> Result<()> {
    let Some(attribute) = attribute else {
        w.write_u8(0)?;
        return Ok(());
    };
    w.write_u8(1)?;
    match attribute {
        AttributeValue::Bool(b) => {
            w.write_u8(0)?;
            w.write_u8(*b as u8)?;
        }
        AttributeValue::Int(v) => {
            w.write_u8(1)?;
            w.write_i32::<LittleEndian>(*v)?;
        }
        AttributeValue::Long(v) => {
            w.write_u8(2)?;
            w.write_i64::<LittleEndian>(*v)?;
        }
        AttributeValue::Float(v) => {
            w.write_u8(3)?;
            w.write_f64::<LittleEndian>(*v)?;
        }
        AttributeValue::Text(code) => {
            w.write_u8(4)?;
            w.write_u32::<LittleEndian>(*code)?;
        }
        AttributeValue::TextSet(codes) => {
            w.write_u8(5)?;
            w.write_u32::<LittleEndian>(codes.len() as u32)?;
            for &code in codes {
                w.write_u32::<LittleEndian>(code)?;
            }
        }
        AttributeValue::RankedText(pairs) => {
            w.write_u8(6)?;
            w.write_u32::<LittleEndian>(pairs.len() as u32)?;
            for &(code, rank) in pairs {
                w.write_u32::<LittleEndian>(code)?;
                w.write_u32::<LittleEndian>(rank)?;
            }
        }
    }
    Ok(())
}

fn write_log<W: Write>(w: &mut W, log: &EventLog) -> Result<()> {
    w.write_u32::<LittleEndian>(log.len() as u32)?;
    for &product in log.products() {
        w.write_u32::<LittleEndian>(product)?;
    }
    w.write_u8(log.columns().len() as u8)?;
    for column in log.columns() {
        match column {
            MetadataColumn::Timestamps(values) => {
                w.write_u8(0)?;
                for &v in values {
                    w.write_i64::<LittleEndian>(v)?;
                }
            }
            MetadataColumn::Ratings(values) => {
                w.write_u8(1)?;
                w.write_all(values)?;
            }
            MetadataColumn::Codes(values) => {
                w.write_u8(2)?;
                for &v in values {
                    w.write_u32::<LittleEndian>(v)?;
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Read path
// =============================================================================

/// Deserialize a snapshot stream into generation parts.
///
/// The attribute schema and event-type configuration come from the caller;
/// the stream carries dictionaries, records, and watermarks. The declared
/// event-type count must match the stream.
pub fn read_snapshot<R: Read>(
    r: &mut R,
    schema: &DomainSchema,
    mut event_types: Vec<EventTypeDescriptor>,
) -> Result<GenerationParts> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != SNAPSHOT_MAGIC {
        return Err(PasandError::Snapshot(format!("bad magic {magic:#x}")));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(PasandError::Snapshot(format!("unsupported format version {version}")));
    }

    let product_ids = read_id_map(r)?;

    let slot_count = r.read_u16::<LittleEndian>()? as usize;
    let mut dictionaries = Vec::with_capacity(slot_count);
    for _ in 0..slot_count {
        let entries = checked_len(r.read_u32::<LittleEndian>()?)?;
        let mut dictionary = ValueDictionary::new();
        for _ in 0..entries {
            let value = read_string(r)?;
            dictionary.get_or_intern(&value);
        }
        dictionaries.push(dictionary);
    }
    let domain = Domain::from_parts(schema, dictionaries)?;

    let product_count = checked_len(r.read_u32::<LittleEndian>()?)?;
    if product_count != product_ids.len() {
        return Err(PasandError::Corruption(format!(
            "product list length {product_count} does not match id map {}",
            product_ids.len()
        )));
    }
    let mut products = Vec::with_capacity(product_count);
    for _ in 0..product_count {
        products.push(read_product(r)?);
    }

    let consumer_ids = read_id_map(r)?;
    let consumer_count = checked_len(r.read_u32::<LittleEndian>()?)?;
    if consumer_count != consumer_ids.len() {
        return Err(PasandError::Corruption(format!(
            "consumer list length {consumer_count} does not match id map {}",
            consumer_ids.len()
        )));
    }
    let mut consumers = Vec::with_capacity(consumer_count);
    for _ in 0..consumer_count {
        consumers.push(Arc::new(read_consumer(r)?));
    }

    let type_count = r.read_u16::<LittleEndian>()? as usize;
    if type_count != event_types.len() {
        return Err(PasandError::SchemaMismatch(format!(
            "snapshot has {type_count} event types, configuration declares {}",
            event_types.len()
        )));
    }
    for descriptor in &mut event_types {
        descriptor.last_event_id = r.read_i64::<LittleEndian>()?;
        descriptor.last_event_ts = r.read_i64::<LittleEndian>()?;
    }

    Ok(GenerationParts {
        domain: Arc::new(domain),
        products,
        product_ids: Arc::new(product_ids),
        consumers,
        consumer_ids: Arc::new(consumer_ids),
        event_types: Arc::new(event_types),
    })
}

fn checked_len(len: u32) -> Result<usize> {
    if len > MAX_LEN {
        return Err(PasandError::Corruption(format!("length field {len} exceeds bound")));
    }
    Ok(len as usize)
}

fn read_id_map<R: Read>(r: &mut R) -> Result<IdMap> {
    let len = checked_len(r.read_u32::<LittleEndian>()?)?;
    let mut externals = Vec::with_capacity(len);
    for _ in 0..len {
        externals.push(r.read_i64::<LittleEndian>()?);
    }
    Ok(IdMap::from_externals(externals))
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = checked_len(r.read_u32::<LittleEndian>()?)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| PasandError::Corruption("non-UTF8 string in snapshot".into()))
}

fn read_product<R: Read>(r: &mut R) -> Result<Option<Arc<Product>>> {
    if r.read_u8()? == 0 {
        return Ok(None);
    }
    let external_id = r.read_i64::<LittleEndian>()?;
    let public_id = read_string(r)?;
    let kind = r.read_u8()?;
    let frequency = r.read_u64::<LittleEndian>()?;
    let attr_count = r.read_u16::<LittleEndian>()? as usize;
    let mut attributes = Vec::with_capacity(attr_count);
    for _ in 0..attr_count {
        attributes.push(read_attribute(r)?);
    }
    Ok(Some(Arc::new(Product { external_id, public_id, kind, attributes, frequency })))
}

fn read_attribute<R: Read>(r: &mut R) -> Result<Option<AttributeValue>> {
    if r.read_u8()? == 0 {
        return Ok(None);
    }
    let tag = r.read_u8()?;
    let value = match tag {
        0 => AttributeValue::Bool(r.read_u8()? != 0),
        1 => AttributeValue::Int(r.read_i32::<LittleEndian>()?),
        2 => AttributeValue::Long(r.read_i64::<LittleEndian>()?),
        3 => AttributeValue::Float(r.read_f64::<LittleEndian>()?),
        4 => AttributeValue::Text(r.read_u32::<LittleEndian>()?),
        5 => {
            let len = checked_len(r.read_u32::<LittleEndian>()?)?;
            let mut codes = Vec::with_capacity(len);
            for _ in 0..len {
                codes.push(r.read_u32::<LittleEndian>()?);
            }
            AttributeValue::TextSet(codes)
        }
        6 => {
            let len = checked_len(r.read_u32::<LittleEndian>()?)?;
            let mut pairs = Vec::with_capacity(len);
            for _ in 0..len {
                let code = r.read_u32::<LittleEndian>()?;
                let rank = r.read_u32::<LittleEndian>()?;
                pairs.push((code, rank));
            }
            AttributeValue::RankedText(pairs)
        }
        other => {
            return Err(PasandError::Corruption(format!("unknown attribute tag {other}")));
        }
    };
    Ok(Some(value))
}

fn read_consumer<R: Read>(r: &mut R) -> Result<Consumer> {
    let external_id = r.read_i64::<LittleEndian>()?;
    let log_count = r.read_u16::<LittleEndian>()? as usize;
    let mut logs = Vec::with_capacity(log_count);
    for _ in 0..log_count {
        logs.push(read_log(r)?);
    }
    Ok(Consumer { external_id, logs })
}

fn read_log<R: Read>(r: &mut R) -> Result<EventLog> {
    let rows = checked_len(r.read_u32::<LittleEndian>()?)?;
    let mut products = Vec::with_capacity(rows);
    for _ in 0..rows {
        products.push(r.read_u32::<LittleEndian>()?);
    }
    let column_count = r.read_u8()? as usize;
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let tag = r.read_u8()?;
        let column = match tag {
            0 => {
                let mut values = Vec::with_capacity(rows);
                for _ in 0..rows {
                    values.push(r.read_i64::<LittleEndian>()?);
                }
                MetadataColumn::Timestamps(values)
            }
            1 => {
                let mut values = vec![0u8; rows];
                r.read_exact(&mut values)?;
                MetadataColumn::Ratings(values)
            }
            2 => {
                let mut values = Vec::with_capacity(rows);
                for _ in 0..rows {
                    values.push(r.read_u32::<LittleEndian>()?);
                }
                MetadataColumn::Codes(values)
            }
            other => {
                return Err(PasandError::Corruption(format!("unknown column tag {other}")));
            }
        };
        columns.push(column);
    }
    Ok(EventLog::from_parts(products, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bad_magic_is_a_snapshot_error() {
        let mut cursor = Cursor::new(vec![0u8; 16]);
        let err = read_snapshot(&mut cursor, &DomainSchema::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, PasandError::Snapshot(_)));
    }

    #[test]
    fn test_truncated_stream_is_an_error_not_a_panic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        // Id map claims 5 entries and stops.
        buf.extend_from_slice(&5u32.to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(read_snapshot(&mut cursor, &DomainSchema::default(), Vec::new()).is_err());
    }

    #[test]
    fn test_oversized_length_field_is_corruption() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_snapshot(&mut cursor, &DomainSchema::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, PasandError::Corruption(_)));
    }
}
