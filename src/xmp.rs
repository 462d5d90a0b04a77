//! XMP document codec: RDF/XML sidecars and embedded packets.
//!
//! Handles the three namespaces photo tools agree on:
//!
//! | Prefix | Namespace | Typical properties |
//! |--------|-----------|--------------------|
//! | `dc` | `http://purl.org/dc/elements/1.1/` | title, description, creator, subject, rights |
//! | `photoshop` | `http://ns.adobe.com/photoshop/1.0/` | Headline, City, Country, Credit |
//! | `xmp` | `http://ns.adobe.com/xap/1.0/` | CreateDate, Rating, Label |
//!
//! Names are matched by namespace URI, not by the prefix a document happens to
//! use, and always reported with the canonical prefix above.
//!
//! ## Shapes
//!
//! A property is a scalar (child element text or attribute) or one of the RDF
//! containers: `rdf:Bag` (unordered set), `rdf:Seq` (ordered list) or
//! `rdf:Alt` (language alternatives, written with one `x-default` entry). The
//! container is chosen from the declared shape, never from the number of
//! values, so a one-element `Seq` stays a `Seq` through write and read.
//!
//! ## Where documents live
//!
//! Sidecars sit beside the image as `photo.xmp`; `photo.jpg.xmp` is accepted
//! when reading. A packet embedded in the image (JPEG APP1, or an
//! `<x:xmpmeta>` block anywhere in the file) wins over a sidecar.
//!
//! ## Rewriting
//!
//! [`parse_document`] returns an [`XmpDocument`]: the modeled properties plus
//! everything else found in the `rdf:Description`s (other namespaces such as
//! `crs` or `xmpMM`, structured values). [`render_document`] writes the
//! unmodeled part back unchanged under the prefixes the source declared, so a
//! merge never loses what it does not understand.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{PrefixDeclaration, ResolveResult};
use quick_xml::reader::NsReader;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::error::{MetaError, Result};
use crate::jpeg::{self, XMP_SIGNATURE};
use crate::normalize::{NormalizeOptions, normalize_with};
use crate::types::{NormalizedValue, RawValue, XmpProperty, XmpRecord, XmpShape};

pub const X_NS: &str = "adobe:ns:meta/";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const PHOTOSHOP_NS: &str = "http://ns.adobe.com/photoshop/1.0/";
pub const XMP_NS: &str = "http://ns.adobe.com/xap/1.0/";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Recognized namespaces as (canonical prefix, URI).
pub const NAMESPACES: [(&str, &str); 3] = [
    ("dc", DC_NS),
    ("photoshop", PHOTOSHOP_NS),
    ("xmp", XMP_NS),
];

const PACKET_HEADER: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n";
const PACKET_TRAILER: &str = "\n<?xpacket end=\"w\"?>";

/// Properties with a conventional shape. Also the names a template may use
/// without a prefix.
pub const KNOWN_PROPERTIES: &[(&str, XmpShape)] = &[
    ("dc:title", XmpShape::Alt),
    ("dc:description", XmpShape::Alt),
    ("dc:rights", XmpShape::Alt),
    ("dc:creator", XmpShape::Seq),
    ("dc:subject", XmpShape::Bag),
    ("dc:publisher", XmpShape::Bag),
    ("dc:contributor", XmpShape::Bag),
    ("dc:date", XmpShape::Seq),
    ("dc:format", XmpShape::Scalar),
    ("dc:identifier", XmpShape::Scalar),
    ("dc:source", XmpShape::Scalar),
    ("dc:type", XmpShape::Bag),
    ("photoshop:Headline", XmpShape::Scalar),
    ("photoshop:DateCreated", XmpShape::Scalar),
    ("photoshop:City", XmpShape::Scalar),
    ("photoshop:State", XmpShape::Scalar),
    ("photoshop:Country", XmpShape::Scalar),
    ("photoshop:Credit", XmpShape::Scalar),
    ("photoshop:Source", XmpShape::Scalar),
    ("photoshop:Instructions", XmpShape::Scalar),
    ("photoshop:AuthorsPosition", XmpShape::Scalar),
    ("photoshop:CaptionWriter", XmpShape::Scalar),
    ("photoshop:Category", XmpShape::Scalar),
    ("photoshop:SupplementalCategories", XmpShape::Bag),
    ("xmp:CreateDate", XmpShape::Scalar),
    ("xmp:ModifyDate", XmpShape::Scalar),
    ("xmp:MetadataDate", XmpShape::Scalar),
    ("xmp:CreatorTool", XmpShape::Scalar),
    ("xmp:Rating", XmpShape::Scalar),
    ("xmp:Label", XmpShape::Scalar),
    ("xmp:Nickname", XmpShape::Scalar),
    ("xmp:Identifier", XmpShape::Bag),
];

fn known_shape(qualified: &str) -> Option<XmpShape> {
    KNOWN_PROPERTIES
        .iter()
        .find(|(name, _)| *name == qualified)
        .map(|(_, shape)| *shape)
}

fn namespace_uri(prefix: &str) -> Option<&'static str> {
    NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}

fn namespace_prefix(uri: &str) -> Option<&'static str> {
    NAMESPACES
        .iter()
        .find(|(_, u)| *u == uri)
        .map(|(prefix, _)| *prefix)
}

/// Qualified name for `name`.
///
/// `prefix:local` is accepted for any recognized prefix. A bare name must match
/// the local part of exactly one known property, ignoring case.
pub fn qualify(name: &str) -> Result<String> {
    if let Some((prefix, local)) = name.split_once(':') {
        if namespace_uri(prefix).is_some() && is_xml_name(local) {
            return Ok(name.to_string());
        }
        return Err(MetaError::UnsupportedProperty(name.to_string()));
    }
    let mut matches = KNOWN_PROPERTIES.iter().filter(|(qualified, _)| {
        qualified
            .split_once(':')
            .is_some_and(|(_, local)| local.eq_ignore_ascii_case(name))
    });
    match (matches.next(), matches.next()) {
        (Some((qualified, _)), None) => Ok((*qualified).to_string()),
        _ => Err(MetaError::UnsupportedProperty(name.to_string())),
    }
}

fn is_xml_name(local: &str) -> bool {
    let mut chars = local.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Build a property for `name`, shaping `value` to the property's declared
/// container.
///
/// Known properties take their table shape. Otherwise a list becomes a `Bag`
/// and anything else a scalar. Scalars given to `Bag`/`Seq` become one-item
/// lists; lists given to a scalar or `Alt` are joined with `"; "`.
pub fn property(name: &str, value: NormalizedValue) -> Result<(String, XmpProperty)> {
    let qualified = qualify(name)?;
    let shape = known_shape(&qualified).unwrap_or(match value {
        NormalizedValue::List(_) => XmpShape::Bag,
        _ => XmpShape::Scalar,
    });
    let value = match (shape, value) {
        (XmpShape::Bag | XmpShape::Seq, NormalizedValue::List(items)) => {
            NormalizedValue::List(items)
        }
        (XmpShape::Bag | XmpShape::Seq, other) if other.is_empty() => NormalizedValue::List(vec![]),
        (XmpShape::Bag | XmpShape::Seq, other) => NormalizedValue::List(vec![other]),
        (_, list @ NormalizedValue::List(_)) => NormalizedValue::text(list.items().join("; ")),
        (_, other) => other,
    };
    Ok((qualified, XmpProperty { shape, value }))
}

// ============================================================================
// Locations
// ============================================================================

/// Where a sidecar for `image` is written: `photo.jpg` → `photo.xmp`.
pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_extension("xmp")
}

/// An existing sidecar for `image`: `photo.xmp`, then `photo.jpg.xmp`.
pub fn find_sidecar(image: &Path) -> Option<PathBuf> {
    let plain = sidecar_path(image);
    if plain.is_file() {
        return Some(plain);
    }
    let mut appended = image.as_os_str().to_owned();
    appended.push(".xmp");
    let appended = PathBuf::from(appended);
    appended.is_file().then_some(appended)
}

// ============================================================================
// Reading
// ============================================================================

/// Load a sidecar document. `Ok(None)` when the file does not exist.
pub fn load_sidecar(path: &Path) -> Result<Option<XmpDocument>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    parse_bytes(&bytes, path).map(Some)
}

/// Properties of a sidecar document. `Ok(None)` when the file does not exist.
pub fn read_sidecar(path: &Path) -> Result<Option<XmpRecord>> {
    Ok(load_sidecar(path)?.map(|doc| doc.record))
}

/// XMP packet embedded in an image's bytes, if any.
pub fn load_embedded(data: &[u8], path: &Path) -> Result<Option<XmpDocument>> {
    match embedded_packet(data) {
        Some(packet) => parse_bytes(packet, path).map(Some),
        None => Ok(None),
    }
}

pub fn read_embedded(data: &[u8], path: &Path) -> Result<Option<XmpRecord>> {
    Ok(load_embedded(data, path)?.map(|doc| doc.record))
}

/// XMP for an image: the embedded packet if present, else a sidecar.
pub fn read_for_image(image: &Path) -> Result<Option<XmpRecord>> {
    let data = fs::read(image)?;
    if let Some(record) = read_embedded(&data, image)? {
        return Ok(Some(record));
    }
    match find_sidecar(image) {
        Some(sidecar) => read_sidecar(&sidecar),
        None => Ok(None),
    }
}

fn embedded_packet(data: &[u8]) -> Option<&[u8]> {
    if jpeg::is_jpeg(data) {
        match jpeg::find_app1(data, XMP_SIGNATURE) {
            Ok(Some(packet)) => return Some(packet),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "JPEG header unreadable, scanning for XMP"),
        }
    }
    let start = find(data, b"<x:xmpmeta")?;
    let end_tag = b"</x:xmpmeta>";
    let end = find(&data[start..], end_tag)? + start + end_tag.len();
    Some(&data[start..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_bytes(bytes: &[u8], path: &Path) -> Result<XmpDocument> {
    let text = std::str::from_utf8(bytes).map_err(|e| malformed(path, e))?;
    parse_document(text.trim_start_matches('\u{feff}'), path)
}

fn malformed(path: &Path, err: impl std::fmt::Display) -> MetaError {
    MetaError::MalformedDocument {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Minimal element tree; XMP documents are small.
#[derive(Debug, Clone, Default)]
struct Element {
    ns: Option<String>,
    local: String,
    /// (namespace, local name, value), namespace declarations excluded.
    attrs: Vec<(Option<String>, String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn is(&self, ns: &str, local: &str) -> bool {
        self.ns.as_deref() == Some(ns) && self.local == local
    }

    /// Every namespace used by this element, its attributes and descendants.
    fn namespaces<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.extend(self.ns.as_deref());
        out.extend(self.attrs.iter().filter_map(|(ns, _, _)| ns.as_deref()));
        for child in &self.children {
            child.namespaces(out);
        }
    }
}

fn namespace_of(resolved: &ResolveResult) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unknown(prefix) if prefix.as_slice() == b"xml" => Some(XML_NS.to_string()),
        _ => None,
    }
}

fn element(
    reader: &NsReader<&[u8]>,
    ns: Option<String>,
    start: &BytesStart,
    declared: &mut Vec<(String, String)>,
    path: &Path,
) -> Result<Element> {
    let mut el = Element {
        ns,
        local: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(path, e))?;
        match attr.key.as_namespace_binding() {
            Some(PrefixDeclaration::Named(prefix)) => {
                let uri = attr.unescape_value().map_err(|e| malformed(path, e))?;
                let prefix = String::from_utf8_lossy(prefix).into_owned();
                if !declared.iter().any(|(known, _)| known.as_str() == uri.as_ref()) {
                    declared.push((uri.into_owned(), prefix));
                }
                continue;
            }
            Some(PrefixDeclaration::Default) => continue,
            None => {}
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let ns = namespace_of(&resolved);
        let value = attr.unescape_value().map_err(|e| malformed(path, e))?;
        el.attrs.push((
            ns,
            String::from_utf8_lossy(local.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(el)
}

/// Parse `text` into an element tree, collecting every `xmlns:prefix`
/// declaration as (namespace, prefix).
fn parse_tree(text: &str, path: &Path) -> Result<(Element, Vec<(String, String)>)> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut stack = vec![Element::default()];
    let mut declared = Vec::new();

    loop {
        let (resolved, event) = reader.read_resolved_event().map_err(|e| malformed(path, e))?;
        let ns = namespace_of(&resolved);
        match event {
            Event::Start(e) => {
                let el = element(&reader, ns, &e, &mut declared, path)?;
                stack.push(el);
            }
            Event::Empty(e) => {
                let el = element(&reader, ns, &e, &mut declared, path)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(el);
                }
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else {
                    return Err(malformed(path, "unbalanced end tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => return Err(malformed(path, "unbalanced end tag")),
                }
            }
            Event::Text(t) => {
                let t = t.unescape().map_err(|e| malformed(path, e))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match stack.pop() {
        Some(root) if stack.is_empty() => Ok((root, declared)),
        _ => Err(malformed(path, "document ended inside an element")),
    }
}

/// Top-level `rdf:Description`s. Descriptions nested inside a property are
/// part of that property's value.
fn descriptions<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    if el.is(RDF_NS, "Description") {
        out.push(el);
        return;
    }
    for child in &el.children {
        descriptions(child, out);
    }
}

fn scalar(text: &str) -> NormalizedValue {
    normalize_with(
        &RawValue::Text(text.to_string()),
        &NormalizeOptions::default().scalar(),
    )
}

/// A parsed document: the properties modeled by [`XmpRecord`] plus the rest
/// of every `rdf:Description`, carried along so a rewrite keeps it.
#[derive(Debug, Clone, Default)]
pub struct XmpDocument {
    pub record: XmpRecord,
    /// Description attributes in other namespaces: (namespace, local, value).
    other_attrs: Vec<(String, String, String)>,
    /// Property elements that are not modeled: other namespaces, or
    /// structured values in the recognized ones.
    other_props: Vec<Element>,
    /// (namespace, prefix) as declared by the source document.
    declared: Vec<(String, String)>,
}

impl From<XmpRecord> for XmpDocument {
    fn from(record: XmpRecord) -> Self {
        Self {
            record,
            ..Self::default()
        }
    }
}

impl XmpDocument {
    /// Number of unmodeled attributes and elements kept from the source.
    pub fn preserved(&self) -> usize {
        self.other_attrs.len() + self.other_props.len()
    }
}

/// Parse an XMP document. Properties from every top-level `rdf:Description`
/// in the recognized namespaces go into the record; everything else is kept
/// as-is in the document.
pub fn parse_document(text: &str, path: &Path) -> Result<XmpDocument> {
    let (root, declared) = parse_tree(text, path)?;
    let mut found = Vec::new();
    descriptions(&root, &mut found);

    let mut doc = XmpDocument {
        declared,
        ..XmpDocument::default()
    };
    for desc in found {
        for (ns, local, value) in &desc.attrs {
            let Some(ns) = ns.as_deref() else {
                continue;
            };
            match namespace_prefix(ns) {
                Some(prefix) => doc.record.insert(
                    format!("{prefix}:{local}"),
                    XmpProperty {
                        shape: XmpShape::Scalar,
                        value: scalar(value),
                    },
                ),
                None if ns == RDF_NS => {}
                None => doc
                    .other_attrs
                    .push((ns.to_string(), local.clone(), value.clone())),
            }
        }
        for child in &desc.children {
            if child.ns.is_none() {
                tracing::debug!(element = %child.local, "XMP property without namespace dropped");
                continue;
            }
            let modeled = child
                .ns
                .as_deref()
                .and_then(namespace_prefix)
                .and_then(|prefix| {
                    read_property(child).map(|prop| (format!("{prefix}:{}", child.local), prop))
                });
            match modeled {
                Some((name, prop)) => doc.record.insert(name, prop),
                None => doc.other_props.push(child.clone()),
            }
        }
    }
    Ok(doc)
}

fn read_property(el: &Element) -> Option<XmpProperty> {
    let container = el.children.iter().find_map(|child| {
        if child.ns.as_deref() != Some(RDF_NS) {
            return None;
        }
        XmpShape::from_container(&child.local).map(|shape| (shape, child))
    });
    if let Some((shape, container)) = container {
        let items = container
            .children
            .iter()
            .filter(|li| li.is(RDF_NS, "li"))
            .map(|li| scalar(&li.text))
            .collect();
        return Some(XmpProperty {
            shape,
            value: NormalizedValue::List(items),
        });
    }
    if !el.children.is_empty() {
        return None;
    }
    let text = el
        .attrs
        .iter()
        .find(|(ns, local, _)| ns.as_deref() == Some(RDF_NS) && local == "resource")
        .map_or(el.text.as_str(), |(_, _, v)| v.as_str());
    Some(XmpProperty {
        shape: XmpShape::Scalar,
        value: scalar(text),
    })
}

// ============================================================================
// Writing
// ============================================================================

fn encoding_error(err: impl std::fmt::Display) -> MetaError {
    MetaError::Encoding {
        tag: "XMP".into(),
        reason: err.to_string(),
    }
}

/// Prefix for every namespace a rendered document uses, as (namespace,
/// prefix). The first `fixed` entries need no declaration on the
/// description.
struct Prefixes {
    map: Vec<(String, String)>,
    fixed: usize,
}

impl Prefixes {
    /// Canonical prefixes for the recognized namespaces; the source's own
    /// prefix for anything else unless it clashes, then `ns1`, `ns2`, ...
    fn assign(doc: &XmpDocument) -> Self {
        let mut map: Vec<(String, String)> = [(X_NS, "x"), (RDF_NS, "rdf"), (XML_NS, "xml")]
            .into_iter()
            .chain(NAMESPACES.iter().map(|(prefix, uri)| (*uri, *prefix)))
            .map(|(uri, prefix)| (uri.to_string(), prefix.to_string()))
            .collect();
        let fixed = map.len();

        let mut used: Vec<&str> = doc.other_attrs.iter().map(|(ns, _, _)| ns.as_str()).collect();
        for el in &doc.other_props {
            el.namespaces(&mut used);
        }
        for ns in used {
            if map.iter().any(|(uri, _)| uri == ns) {
                continue;
            }
            let taken = |p: &str| map.iter().any(|(_, prefix)| prefix == p);
            let declared = doc
                .declared
                .iter()
                .find(|(uri, _)| uri == ns)
                .map(|(_, prefix)| prefix.as_str())
                .filter(|p| !taken(*p));
            let prefix = match declared {
                Some(p) => p.to_string(),
                None => (1u32..)
                    .map(|n| format!("ns{n}"))
                    .find(|p| !taken(p.as_str()))
                    .unwrap_or_default(),
            };
            map.push((ns.to_string(), prefix));
        }
        Self { map, fixed }
    }

    fn declarations(&self) -> &[(String, String)] {
        &self.map[self.fixed..]
    }

    fn qualified(&self, ns: Option<&str>, local: &str) -> String {
        match ns.and_then(|ns| self.map.iter().find(|(uri, _)| uri == ns)) {
            Some((_, prefix)) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }
}

/// Render `doc` as a complete `x:xmpmeta` document.
pub fn render_document(doc: &XmpDocument) -> Result<String> {
    let record = &doc.record;
    for (name, _) in record.iter() {
        match name.split_once(':') {
            Some((prefix, local)) if namespace_uri(prefix).is_some() && is_xml_name(local) => {}
            _ => return Err(MetaError::UnsupportedProperty(name.clone())),
        }
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
    let w = &mut writer;

    let mut xmpmeta = BytesStart::new("x:xmpmeta");
    xmpmeta.push_attribute(("xmlns:x", X_NS));
    start(w, xmpmeta)?;

    let mut rdf = BytesStart::new("rdf:RDF");
    rdf.push_attribute(("xmlns:rdf", RDF_NS));
    start(w, rdf)?;

    let prefixes = Prefixes::assign(doc);
    let mut desc = BytesStart::new("rdf:Description");
    desc.push_attribute(("rdf:about", ""));
    for (prefix, uri) in NAMESPACES {
        desc.push_attribute((format!("xmlns:{prefix}").as_str(), uri));
    }
    for (uri, prefix) in prefixes.declarations() {
        desc.push_attribute((format!("xmlns:{prefix}").as_str(), uri.as_str()));
    }
    for (ns, local, value) in &doc.other_attrs {
        desc.push_attribute((prefixes.qualified(Some(ns), local).as_str(), value.as_str()));
    }
    start(w, desc)?;

    for (name, prop) in record.iter() {
        write_property(w, name, prop)?;
    }
    for el in &doc.other_props {
        let name = prefixes.qualified(el.ns.as_deref(), &el.local);
        // A modeled property of the same name replaces the kept one.
        if record.get(&name).is_some() {
            continue;
        }
        write_element(w, el, &prefixes)?;
    }

    end(w, "rdf:Description")?;
    end(w, "rdf:RDF")?;
    end(w, "x:xmpmeta")?;

    String::from_utf8(writer.into_inner()).map_err(encoding_error)
}

fn start(w: &mut Writer<Vec<u8>>, el: BytesStart) -> Result<()> {
    w.write_event(Event::Start(el)).map_err(encoding_error)
}

fn end(w: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))
        .map_err(encoding_error)
}

fn text_element(w: &mut Writer<Vec<u8>>, el: BytesStart, text: &str) -> Result<()> {
    let name = String::from_utf8_lossy(el.name().as_ref()).into_owned();
    start(w, el)?;
    w.write_event(Event::Text(BytesText::new(text)))
        .map_err(encoding_error)?;
    end(w, &name)
}

fn write_element(w: &mut Writer<Vec<u8>>, el: &Element, prefixes: &Prefixes) -> Result<()> {
    let name = prefixes.qualified(el.ns.as_deref(), &el.local);
    let mut tag = BytesStart::new(name.as_str());
    for (ns, local, value) in &el.attrs {
        tag.push_attribute((prefixes.qualified(ns.as_deref(), local).as_str(), value.as_str()));
    }
    if el.children.is_empty() && el.text.is_empty() {
        return w.write_event(Event::Empty(tag)).map_err(encoding_error);
    }
    start(w, tag)?;
    if !el.text.is_empty() {
        w.write_event(Event::Text(BytesText::new(&el.text)))
            .map_err(encoding_error)?;
    }
    for child in &el.children {
        write_element(w, child, prefixes)?;
    }
    end(w, &name)
}

fn write_property(w: &mut Writer<Vec<u8>>, name: &str, prop: &XmpProperty) -> Result<()> {
    let Some(container) = prop.shape.container() else {
        return text_element(w, BytesStart::new(name), &prop.value.to_string());
    };

    let container = format!("rdf:{container}");
    start(w, BytesStart::new(name))?;
    let items = match prop.shape {
        XmpShape::Alt => vec![prop.value.items().join("; ")],
        _ => prop.value.items(),
    };
    if items.is_empty() {
        w.write_event(Event::Empty(BytesStart::new(container.as_str())))
            .map_err(encoding_error)?;
    } else {
        start(w, BytesStart::new(container.as_str()))?;
        for item in &items {
            let mut li = BytesStart::new("rdf:li");
            if prop.shape == XmpShape::Alt {
                li.push_attribute(("xml:lang", "x-default"));
            }
            text_element(w, li, item)?;
        }
        end(w, &container)?;
    }
    end(w, name)
}

/// Write `doc` as a sidecar document at `path`, replacing it atomically.
pub fn write_sidecar(path: &Path, doc: &XmpDocument) -> Result<()> {
    let text = render_document(doc)?;
    let mut bytes = Vec::with_capacity(text.len() + 40);
    bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    atomic::replace_file(path, &bytes)?;
    tracing::debug!(
        file = %path.display(),
        properties = doc.record.len(),
        preserved = doc.preserved(),
        "wrote XMP sidecar"
    );
    Ok(())
}

/// Embed `doc` as an XMP packet in the JPEG at `path`.
pub fn write_embedded(path: &Path, doc: &XmpDocument) -> Result<()> {
    let data = fs::read(path)?;
    if !jpeg::is_jpeg(&data) {
        return Err(MetaError::UnsupportedFormat(path.to_path_buf()));
    }
    let packet = format!("{PACKET_HEADER}{}{PACKET_TRAILER}", render_document(doc)?);
    let updated = jpeg::rewrite_app1(&data, XMP_SIGNATURE, Some(packet.as_bytes()))?;
    atomic::replace_file(path, &updated)?;
    tracing::debug!(file = %path.display(), properties = doc.record.len(), "embedded XMP packet");
    Ok(())
}
