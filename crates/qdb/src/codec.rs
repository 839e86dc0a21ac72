//! Newline-delimited JSON framing used by stream transports.
use std::io::{BufRead, Write};

use crate::{error::TransportError, protocol::Message};

pub fn encode(message: &Message) -> Result<Vec<u8>, TransportError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode(line: &str) -> Result<Message, TransportError> {
    Ok(serde_json::from_str(line.trim_end())?)
}

pub fn write_message(writer: &mut impl Write, message: &Message) -> Result<(), TransportError> {
    writer.write_all(&encode(message)?)?;
    writer.flush()?;
    Ok(())
}

/// Reads the next frame. Blank lines are skipped and `None` marks end of stream.
pub fn read_message(reader: &mut impl BufRead) -> Result<Option<Message>, TransportError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return decode(&line).map(Some);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response};
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_stream_of_frames() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &Request::notification("write", vec![json!("a\nb")]).into()).unwrap();
        buffer.extend_from_slice(b"\n");
        write_message(&mut buffer, &Response::ok(4, json!([1, 2])).into()).unwrap();

        let mut reader = Cursor::new(buffer);
        assert_eq!(
            read_message(&mut reader).unwrap(),
            Some(Request::notification("write", vec![json!("a\nb")]).into())
        );
        assert_eq!(read_message(&mut reader).unwrap(), Some(Response::ok(4, json!([1, 2])).into()));
        assert_eq!(read_message(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_malformed_frame() {
        let mut reader = Cursor::new(b"{\"id\": 1,\n".to_vec());
        assert!(matches!(read_message(&mut reader), Err(TransportError::Codec(_))));
    }
}
