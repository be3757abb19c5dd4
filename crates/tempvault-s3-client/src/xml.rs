//! ListObjectsV2 response parsing.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{StorageError, StorageResult};

/// Keys from one page of a ListObjectsV2 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ListPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
}

/// Pull every `Contents/Key` and the `IsTruncated` flag out of a listing body.
pub(crate) fn parse_list_keys(xml: &[u8]) -> StorageResult<ListPage> {
    // Untrimmed: whitespace inside a key is significant, even next to an entity.
    let mut reader = Reader::from_reader(xml);

    let mut page = ListPage::default();
    let mut in_contents = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Contents" => in_contents = true,
                b"Key" if in_contents => page.keys.push(read_text_content(&mut reader)?),
                b"IsTruncated" if !in_contents => {
                    let flag = read_text_content(&mut reader)?;
                    page.is_truncated = flag.trim().eq_ignore_ascii_case("true");
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"Contents" => in_contents = false,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(page)
}

/// Read the text of the current element through its end tag.
fn read_text_content(reader: &mut Reader<&[u8]>) -> StorageResult<String> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e.decode().map_err(|err| StorageError::Xml(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| StorageError::Xml(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| StorageError::Xml(err.to_string()))?
                {
                    text.push(ch);
                    continue;
                }
                let name = e.decode().map_err(|err| StorageError::Xml(err.to_string()))?;
                let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                    .ok_or_else(|| StorageError::Xml(format!("unknown entity &{name};")))?;
                text.push_str(resolved);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(StorageError::Xml("unexpected end of document".to_owned()));
            }
            _ => {}
        }
    }
}
