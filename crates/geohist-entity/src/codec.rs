//! History block encoder and decoder.
//!
//! Records are written oldest first. Each field is a delta against the same
//! field of the previous record; tags and member lists are repeated by flag
//! when unchanged from the last visible version.

use bytes::Bytes;
use geohist_codes::{Code, CodeSpace, CodeTable};
use geohist_protocol::{BlockReader, BlockWriter, DecodeErrorKind};
use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    BlockHeader, BlockResult, BoundingBox, Coordinate, EncodeError, EncodedBlock, EntityKind,
    Member, Payload, Tag, Timestamp, Version, VersionedEntity,
    block::RecordFlags,
};

/// Encode a history. Nodes carry bounds derived from their own coordinates;
/// ways and relations are written without bounds.
pub fn encode(entity: &VersionedEntity, codes: &CodeTable) -> Result<EncodedBlock, EncodeError> {
    let bounds = match entity.kind() {
        EntityKind::Node => entity.node_bounds(),
        EntityKind::Way | EntityKind::Relation => None,
    };
    encode_with_bounds(entity, bounds, codes)
}

/// Encode a history with a caller-computed bounding box.
///
/// Every key, value and role code must already be known to `codes`.
pub fn encode_with_bounds(
    entity: &VersionedEntity,
    bounds: Option<BoundingBox>,
    codes: &CodeTable,
) -> Result<EncodedBlock, EncodeError> {
    if let Some(b) = bounds {
        if BoundingBox::new(b.min, b.max).is_none() {
            return Err(EncodeError::InvertedBounds);
        }
        if entity.kind() == EntityKind::Node
            && entity
                .versions()
                .iter()
                .filter_map(Version::coordinate)
                .any(|c| !b.contains(c))
        {
            return Err(EncodeError::OutsideBounds);
        }
    }

    let key_table = KeyTable::collect(entity);
    ensure_codes(entity, &key_table.keys, codes)?;

    let header = BlockHeader {
        kind: entity.kind(),
        id: entity.id(),
        base_timestamp: entity.versions()[0].timestamp,
        base: bounds.map_or_else(Coordinate::default, |b| b.min),
        bounds,
    };

    let mut writer = BlockWriter::with_capacity(32 + entity.versions().len() * 16);
    header.write(&mut writer);

    writer.put_uvarint(key_table.keys.len() as u64);
    for key in &key_table.keys {
        writer.put_uvarint(u64::from(key.as_raw()));
    }
    writer.put_uvarint(entity.versions().len() as u64);

    let mut state = DeltaState::new(&header);
    for version in entity.versions() {
        write_record(&mut writer, &mut state, &key_table, entity.kind(), version);
    }

    let bytes = Bytes::from(writer.into_inner());
    trace!(
        entity = %entity.entity(),
        versions = entity.versions().len(),
        bytes = bytes.len(),
        "encoded history block"
    );
    Ok(EncodedBlock::from_parts(bytes, header))
}

/// Decode a block into its full history.
///
/// Fails on the first malformed field, naming its byte offset, or when the
/// block references a code `codes` cannot resolve.
pub fn decode(block: &EncodedBlock, codes: &CodeTable) -> BlockResult<VersionedEntity> {
    let mut reader = BlockReader::new(block.as_bytes());
    let header = BlockHeader::read(&mut reader)?;

    let key_count = reader.read_count(1)?;
    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        keys.push(Code::from_raw(reader.read_uvarint32()?));
    }

    let count_offset = reader.offset();
    let count = reader.read_count(3)?;
    if count == 0 {
        return Err(reader_error(count_offset, "block has no versions"));
    }

    let mut state = DeltaState::new(&header);
    let mut seen = SeenCodes::default();
    let mut versions = Vec::with_capacity(count);
    for index in 0..count {
        let version = read_record(&mut reader, &mut state, &keys, header.kind, index)?;
        seen.note(&version, header.kind);
        versions.push(version);
    }
    reader.finish()?;

    codes.ensure_known(CodeSpace::Key, &keys)?;
    seen.ensure_known(codes)?;

    Ok(VersionedEntity::from_parts_unchecked(
        header.kind,
        header.id,
        versions,
    ))
}

impl VersionedEntity {
    /// Shorthand for [`encode`].
    pub fn encode(&self, codes: &CodeTable) -> Result<EncodedBlock, EncodeError> {
        encode(self, codes)
    }
}

/// Block-local key table: distinct key codes in order of first use.
struct KeyTable {
    keys: Vec<Code>,
    index: HashMap<Code, usize>,
}

impl KeyTable {
    fn collect(entity: &VersionedEntity) -> Self {
        let mut keys = Vec::new();
        let mut index = HashMap::new();
        for tag in entity.versions().iter().flat_map(|v| v.tags.iter()) {
            index.entry(tag.key).or_insert_with(|| {
                keys.push(tag.key);
                keys.len() - 1
            });
        }
        Self { keys, index }
    }

    fn index_of(&self, key: Code) -> usize {
        // Built from the same versions being written.
        self.index.get(&key).copied().unwrap_or_default()
    }
}

fn ensure_codes(
    entity: &VersionedEntity,
    keys: &[Code],
    codes: &CodeTable,
) -> Result<(), EncodeError> {
    let mut seen = SeenCodes::default();
    for version in entity.versions() {
        seen.note(version, entity.kind());
    }
    codes.ensure_known(CodeSpace::Key, keys)?;
    seen.ensure_known(codes)?;
    Ok(())
}

/// Value and role codes referenced by a history.
#[derive(Default)]
struct SeenCodes {
    values: Vec<Code>,
    roles: Vec<Code>,
}

impl SeenCodes {
    /// Way member roles are implicit and never stored.
    fn note(&mut self, version: &Version, kind: EntityKind) {
        self.values.extend(version.tags.iter().map(|t| t.value));
        if kind == EntityKind::Relation {
            self.roles.extend(version.members().iter().map(|m| m.role));
        }
    }

    fn ensure_known(mut self, codes: &CodeTable) -> Result<(), geohist_codes::CodeError> {
        for list in [&mut self.values, &mut self.roles] {
            list.sort_unstable();
            list.dedup();
        }
        codes.ensure_known(CodeSpace::Value, &self.values)?;
        codes.ensure_known(CodeSpace::Role, &self.roles)
    }
}

/// Running "previous value" of every delta-coded field.
struct DeltaState {
    timestamp: u64,
    version: u32,
    changeset: i64,
    user: u32,
    coordinate: Coordinate,
    tags: SmallVec<[Tag; 4]>,
    members: Vec<Member>,
}

impl DeltaState {
    fn new(header: &BlockHeader) -> Self {
        Self {
            timestamp: header.base_timestamp.as_secs(),
            version: 0,
            changeset: 0,
            user: 0,
            coordinate: header.base,
            tags: SmallVec::new(),
            members: Vec::new(),
        }
    }
}

fn write_record(
    writer: &mut BlockWriter,
    state: &mut DeltaState,
    key_table: &KeyTable,
    kind: EntityKind,
    version: &Version,
) {
    let mut flags = RecordFlags::empty();
    flags.set(RecordFlags::VISIBLE, version.visible);
    flags.set(RecordFlags::NEW_CHANGESET, version.changeset != state.changeset);
    flags.set(RecordFlags::NEW_USER, version.user != state.user);
    if version.visible {
        flags.set(RecordFlags::SAME_TAGS, version.tags == state.tags);
        if let Payload::Members(members) = &version.payload {
            flags.set(RecordFlags::SAME_MEMBERS, *members == state.members);
        }
    }

    writer.put_uvarint(version.timestamp.as_secs() - state.timestamp);
    writer.put_u8(flags.bits());
    writer.put_uvarint(u64::from(version.version - state.version));
    state.timestamp = version.timestamp.as_secs();
    state.version = version.version;

    if flags.contains(RecordFlags::NEW_CHANGESET) {
        writer.put_svarint(version.changeset.wrapping_sub(state.changeset));
        state.changeset = version.changeset;
    }
    if flags.contains(RecordFlags::NEW_USER) {
        writer.put_uvarint(u64::from(version.user));
        state.user = version.user;
    }
    if !version.visible {
        return;
    }

    if !flags.contains(RecordFlags::SAME_TAGS) {
        writer.put_uvarint(version.tags.len() as u64);
        for tag in &version.tags {
            writer.put_uvarint(key_table.index_of(tag.key) as u64);
            writer.put_uvarint(u64::from(tag.value.as_raw()));
        }
        state.tags.clone_from(&version.tags);
    }

    match &version.payload {
        Payload::Node(c) => {
            writer.put_svarint(i64::from(c.lon) - i64::from(state.coordinate.lon));
            writer.put_svarint(i64::from(c.lat) - i64::from(state.coordinate.lat));
            state.coordinate = *c;
        }
        Payload::Members(members) if !flags.contains(RecordFlags::SAME_MEMBERS) => {
            writer.put_uvarint(members.len() as u64);
            let mut previous_id = 0i64;
            for member in members {
                if kind == EntityKind::Relation {
                    let role_kind = (u64::from(member.role.as_raw()) << 2)
                        | u64::from(member.kind.as_raw());
                    writer.put_uvarint(role_kind);
                }
                writer.put_svarint(member.id.wrapping_sub(previous_id));
                previous_id = member.id;
            }
            state.members.clone_from(members);
        }
        Payload::Members(_) | Payload::Empty => {}
    }
}

fn read_record(
    reader: &mut BlockReader<'_>,
    state: &mut DeltaState,
    keys: &[Code],
    kind: EntityKind,
    index: usize,
) -> BlockResult<Version> {
    let offset = reader.offset();
    let delta = reader.read_uvarint()?;
    if index == 0 && delta != 0 {
        return Err(reader_error(offset, "first record must start at the base timestamp"));
    }
    if index > 0 && delta == 0 {
        return Err(reader_error(offset, "timestamps must strictly increase"));
    }
    let timestamp = state
        .timestamp
        .checked_add(delta)
        .ok_or_else(|| overflow(offset, 64))?;

    let offset = reader.offset();
    let raw = reader.read_u8()?;
    let flags = RecordFlags::from_bits(raw).ok_or_else(|| {
        geohist_protocol::DecodeError::new(
            offset,
            DecodeErrorKind::UnknownFlags(raw & !RecordFlags::all().bits()),
        )
    })?;
    let visible = flags.contains(RecordFlags::VISIBLE);
    if !visible && flags.intersects(RecordFlags::SAME_TAGS | RecordFlags::SAME_MEMBERS) {
        return Err(reader_error(offset, "deleted record repeats content"));
    }
    if kind == EntityKind::Node && flags.contains(RecordFlags::SAME_MEMBERS) {
        return Err(reader_error(offset, "node record repeats members"));
    }

    let offset = reader.offset();
    let delta = reader.read_uvarint32()?;
    if index > 0 && delta == 0 {
        return Err(reader_error(offset, "version numbers must strictly increase"));
    }
    let version_number = state
        .version
        .checked_add(delta)
        .ok_or_else(|| overflow(offset, 32))?;

    state.timestamp = timestamp;
    state.version = version_number;

    if flags.contains(RecordFlags::NEW_CHANGESET) {
        state.changeset = state.changeset.wrapping_add(reader.read_svarint()?);
    }
    if flags.contains(RecordFlags::NEW_USER) {
        state.user = reader.read_uvarint32()?;
    }

    let mut version = Version::deleted(version_number, Timestamp::from_secs(timestamp))
        .with_changeset(state.changeset)
        .with_user(state.user);
    if !visible {
        return Ok(version);
    }
    version.visible = true;

    if !flags.contains(RecordFlags::SAME_TAGS) {
        let count = reader.read_count(2)?;
        let mut tags = SmallVec::with_capacity(count);
        for _ in 0..count {
            let offset = reader.offset();
            let slot = reader.read_uvarint()?;
            let key = usize::try_from(slot)
                .ok()
                .and_then(|slot| keys.get(slot))
                .ok_or_else(|| reader_error(offset, "key table index out of range"))?;
            let value = Code::from_raw(reader.read_uvarint32()?);
            tags.push(Tag::new(*key, value));
        }
        state.tags = tags;
    }
    version.tags.clone_from(&state.tags);

    version.payload = match kind {
        EntityKind::Node => {
            let lon = accumulate(reader, state.coordinate.lon)?;
            let lat = accumulate(reader, state.coordinate.lat)?;
            state.coordinate = Coordinate::new(lon, lat);
            Payload::Node(state.coordinate)
        }
        EntityKind::Way | EntityKind::Relation => {
            if !flags.contains(RecordFlags::SAME_MEMBERS) {
                state.members = read_members(reader, kind)?;
            }
            Payload::Members(state.members.clone())
        }
    };
    Ok(version)
}

fn read_members(reader: &mut BlockReader<'_>, kind: EntityKind) -> BlockResult<Vec<Member>> {
    let min_len = if kind == EntityKind::Relation { 2 } else { 1 };
    let count = reader.read_count(min_len)?;
    let mut members = Vec::with_capacity(count);
    let mut previous_id = 0i64;
    for _ in 0..count {
        let (member_kind, role) = if kind == EntityKind::Relation {
            let offset = reader.offset();
            let role_kind = reader.read_uvarint()?;
            let member_kind = EntityKind::from_raw((role_kind & 0b11) as u8)
                .ok_or_else(|| reader_error(offset, "unknown member kind"))?;
            let role = u32::try_from(role_kind >> 2).map_err(|_| overflow(offset, 32))?;
            (member_kind, Code::from_raw(role))
        } else {
            (EntityKind::Node, Code::from_raw(0))
        };
        previous_id = previous_id.wrapping_add(reader.read_svarint()?);
        members.push(Member::new(member_kind, previous_id, role));
    }
    Ok(members)
}

/// Add a zigzag delta in 64 bits and range-check the result back to 32.
fn accumulate(reader: &mut BlockReader<'_>, previous: i32) -> BlockResult<i32> {
    let offset = reader.offset();
    let delta = reader.read_svarint()?;
    i64::from(previous)
        .checked_add(delta)
        .and_then(|value| i32::try_from(value).ok())
        .ok_or_else(|| overflow(offset, 32))
}

fn reader_error(offset: usize, reason: &'static str) -> crate::BlockError {
    geohist_protocol::DecodeError::new(offset, DecodeErrorKind::Invalid(reason)).into()
}

fn overflow(offset: usize, bits: u32) -> crate::BlockError {
    geohist_protocol::DecodeError::new(offset, DecodeErrorKind::Overflow { bits }).into()
}
