// Minimal protobuf wire helpers for varint-only messages.

const WIRE_TYPE_VARINT: u8 = 0;

pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

pub fn encode_varint_field(field: u32, value: u64, out: &mut Vec<u8>) {
    let tag = ((field as u64) << 3) | WIRE_TYPE_VARINT as u64;
    encode_varint(tag, out);
    encode_varint(value, out);
}

// Decoding is only needed to check encoded payloads in tests.
#[cfg(test)]
pub fn read_varint(data: &[u8], offset: usize) -> Result<(u64, usize), String> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut pos = offset;

    loop {
        if pos >= data.len() {
            return Err("incomplete_data".to_string());
        }
        if shift >= 64 {
            return Err("varint_overflow".to_string());
        }
        let byte = data[pos];
        result |= ((byte & 0x7F) as u64) << shift;
        pos += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok((result, pos))
}

// Decodes a message made only of varint fields into (field, value) pairs.
#[cfg(test)]
pub fn read_varint_fields(data: &[u8]) -> Result<Vec<(u32, u64)>, String> {
    let mut fields = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (tag, next) = read_varint(data, offset)?;
        let wire_type = (tag & 7) as u8;
        if wire_type != WIRE_TYPE_VARINT {
            return Err(format!("unsupported_wire_type: {}", wire_type));
        }
        let (value, next) = read_varint(data, next)?;
        fields.push(((tag >> 3) as u32, value));
        offset = next;
    }
    Ok(fields)
}
