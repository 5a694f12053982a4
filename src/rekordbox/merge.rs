use std::collections::{HashMap, HashSet};
use std::ops::Range;

use roxmltree::{Document, Node};
use serde::Serialize;

use super::ExportError;

pub const DEFAULT_FOLDER_NAME: &str = "Cratedigger";

const INDENT_UNIT: &str = "  ";
const FOLDER_NODE: &str = "0";
const PLAYLIST_NODE: &str = "1";

/// A downloaded track ready to be referenced from the library.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTrack {
    pub title: String,
    pub artist: String,
    /// `file://localhost/...` URL, also the identity of the track in the collection.
    pub location: String,
    pub bpm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlaylist {
    pub name: String,
    pub tracks: Vec<ExportTrack>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub added_playlists: usize,
    pub added_tracks: usize,
}

/// Merge `playlists` into the Rekordbox document `xml`.
///
/// Playlists whose name already exists anywhere under `PLAYLISTS` are left
/// alone. New playlists go into the `folder_name` folder, which is created
/// under `ROOT` when missing. Collection tracks are keyed by `Location`.
pub fn merge_library(
    xml: &str,
    playlists: &[ExportPlaylist],
    folder_name: &str,
) -> Result<(String, MergeSummary), ExportError> {
    let doc = Document::parse(xml)
        .map_err(|e| ExportError::InvalidDocument(format!("failed to parse XML: {}", e)))?;
    let collection = find_element(&doc, "COLLECTION")
        .ok_or_else(|| ExportError::InvalidDocument("missing COLLECTION".to_string()))?;
    let playlists_root = find_element(&doc, "PLAYLISTS")
        .ok_or_else(|| ExportError::InvalidDocument("missing PLAYLISTS".to_string()))?;

    let collection_tracks: Vec<Node> = collection
        .children()
        .filter(|n| n.has_tag_name("TRACK"))
        .collect();
    let mut known_tracks: HashMap<String, i64> = HashMap::new();
    let mut max_id = 0;
    for track in &collection_tracks {
        let Some(id) = track
            .attribute("TrackID")
            .and_then(|v| v.trim().parse::<i64>().ok())
        else {
            continue;
        };
        max_id = max_id.max(id);
        if let Some(location) = track.attribute("Location") {
            known_tracks.entry(location.to_string()).or_insert(id);
        }
    }

    let known_playlists: HashSet<&str> = playlists_root
        .descendants()
        .filter(|n| is_node_of_type(n, PLAYLIST_NODE))
        .filter_map(|n| n.attribute("Name"))
        .collect();

    let mut next_id = max_id + 1;
    let mut new_tracks = Vec::new();
    let mut new_playlists = Vec::new();
    for playlist in playlists {
        if known_playlists.contains(playlist.name.as_str()) {
            continue;
        }
        let mut entries = Vec::with_capacity(playlist.tracks.len());
        for track in &playlist.tracks {
            let id = match known_tracks.get(&track.location) {
                Some(id) => *id,
                None => {
                    let id = next_id;
                    next_id += 1;
                    known_tracks.insert(track.location.clone(), id);
                    new_tracks.push(collection_track(id, track));
                    id
                }
            };
            entries.push(Element::new("TRACK").attr("Key", id.to_string()));
        }
        new_playlists.push(
            Element::new("NODE")
                .attr("Name", playlist.name.as_str())
                .attr("Type", PLAYLIST_NODE)
                .attr("KeyType", "0")
                .attr("Entries", entries.len().to_string())
                .with_children(entries),
        );
    }

    let summary = MergeSummary {
        added_playlists: new_playlists.len(),
        added_tracks: new_tracks.len(),
    };
    if new_playlists.is_empty() {
        return Ok((xml.to_string(), summary));
    }

    let mut splicer = Splicer::new(xml);
    if !new_tracks.is_empty() {
        splicer.set_attribute_if_present(
            collection,
            "Entries",
            collection_tracks.len() + new_tracks.len(),
        );
        splicer.append_children(collection, &new_tracks);
    }

    let folder = playlists_root
        .descendants()
        .find(|n| is_node_of_type(n, FOLDER_NODE) && n.attribute("Name") == Some(folder_name));
    match folder {
        Some(folder) => {
            let existing = count_nodes(folder);
            splicer.set_attribute_if_present(folder, "Count", existing + new_playlists.len());
            splicer.append_children(folder, &new_playlists);
        }
        None => {
            let parent = playlists_root
                .children()
                .find(|n| is_node_of_type(n, FOLDER_NODE) && n.attribute("Name") == Some("ROOT"))
                .unwrap_or(playlists_root);
            let folder = Element::new("NODE")
                .attr("Type", FOLDER_NODE)
                .attr("Name", folder_name)
                .attr("Count", new_playlists.len().to_string())
                .with_children(new_playlists);
            splicer.set_attribute_if_present(parent, "Count", count_nodes(parent) + 1);
            splicer.append_children(parent, std::slice::from_ref(&folder));
        }
    }

    Ok((splicer.finish(), summary))
}

fn find_element<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Option<Node<'a, 'input>> {
    doc.descendants().find(|n| n.has_tag_name(name))
}

fn is_node_of_type(node: &Node, node_type: &str) -> bool {
    node.has_tag_name("NODE") && node.attribute("Type") == Some(node_type)
}

fn count_nodes(node: Node) -> usize {
    node.children().filter(|n| n.has_tag_name("NODE")).count()
}

fn collection_track(id: i64, track: &ExportTrack) -> Element {
    let element = Element::new("TRACK")
        .attr("TrackID", id.to_string())
        .attr("Name", track.title.as_str())
        .attr("Artist", track.artist.as_str())
        .attr("Location", track.location.as_str());
    match track.bpm {
        Some(bpm) => element.attr("AverageBpm", format!("{:.2}", bpm)),
        None => element,
    }
}

/// A node to be written out.
#[derive(Debug, Clone)]
struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((name, value.into()));
        self
    }

    fn with_children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }

    /// `indent` is the indentation of this element's own line, `None` for
    /// compact output.
    fn render(&self, indent: Option<&str>, out: &mut String) {
        out.push('<');
        out.push_str(self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attribute(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        let child_indent = indent.map(|i| format!("{}{}", i, INDENT_UNIT));
        for child in &self.children {
            if let Some(child_indent) = &child_indent {
                out.push('\n');
                out.push_str(child_indent);
            }
            child.render(child_indent.as_deref(), out);
        }
        if let Some(indent) = indent {
            out.push('\n');
            out.push_str(indent);
        }
        out.push_str("</");
        out.push_str(self.name);
        out.push('>');
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            c => escaped.push(c),
        }
    }
    escaped
}

struct Edit {
    range: Range<usize>,
    text: String,
}

/// Collects non-overlapping replacements against the source text.
struct Splicer<'a> {
    source: &'a str,
    edits: Vec<Edit>,
}

impl<'a> Splicer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    fn append_children(&mut self, parent: Node, children: &[Element]) {
        let range = parent.range();
        let element = &self.source[range.clone()];
        let tag = parent.tag_name().name();

        if element.ends_with("/>") {
            let indent = line_indent(self.source, range.start);
            let mut text = String::from(">");
            let child_indent = format!("{}{}", indent, INDENT_UNIT);
            for child in children {
                text.push('\n');
                text.push_str(&child_indent);
                child.render(Some(&child_indent), &mut text);
            }
            text.push('\n');
            text.push_str(indent);
            text.push_str("</");
            text.push_str(tag);
            text.push('>');
            self.edits.push(Edit {
                range: range.end - 2..range.end,
                text,
            });
            return;
        }

        let Some(close) = element.rfind("</") else {
            return;
        };
        let close_start = range.start + close;
        let before = &self.source[..close_start];
        let indent_start = before.trim_end_matches([' ', '\t']).len();
        let mut text = String::new();
        if before[..indent_start].ends_with('\n') {
            let indent = &before[indent_start..];
            let child_indent = format!("{}{}", indent, INDENT_UNIT);
            for child in children {
                text.push_str(INDENT_UNIT);
                child.render(Some(&child_indent), &mut text);
                text.push('\n');
                text.push_str(indent);
            }
        } else {
            for child in children {
                child.render(None, &mut text);
            }
        }
        self.edits.push(Edit {
            range: close_start..close_start,
            text,
        });
    }

    fn set_attribute_if_present(&mut self, node: Node, name: &str, value: usize) {
        let start = node.range().start;
        let tag = &self.source[start..node.range().end];
        if let Some(value_range) = attribute_value_range(tag, name) {
            self.edits.push(Edit {
                range: start + value_range.start..start + value_range.end,
                text: value.to_string(),
            });
        }
    }

    fn finish(mut self) -> String {
        self.edits.sort_by_key(|e| (e.range.start, e.range.end));
        let mut out = String::with_capacity(self.source.len() + 1024);
        let mut cursor = 0;
        for edit in &self.edits {
            out.push_str(&self.source[cursor..edit.range.start]);
            out.push_str(&edit.text);
            cursor = edit.range.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

/// Whitespace preceding `pos` on its line, or nothing if other text precedes it.
fn line_indent(source: &str, pos: usize) -> &str {
    let line_start = source[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &source[line_start..pos];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

/// Byte range of the value of attribute `name` within the start tag at the
/// beginning of `tag`.
fn attribute_value_range(tag: &str, name: &str) -> Option<Range<usize>> {
    let bytes = tag.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, b) in bytes.iter().copied().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'>' => return None,
            b if b.is_ascii_whitespace() && tag[i + 1..].starts_with(name) => {
                let rest = tag[i + 1 + name.len()..].trim_start();
                let Some(after_eq) = rest.strip_prefix('=') else {
                    continue;
                };
                let value = after_eq.trim_start();
                let Some(q) = value.chars().next().filter(|c| *c == '"' || *c == '\'') else {
                    continue;
                };
                let value_start = tag.len() - value.len() + 1;
                let len = tag[value_start..].find(q)?;
                return Some(value_start..value_start + len);
            }
            _ => {}
        }
    }
    None
}
