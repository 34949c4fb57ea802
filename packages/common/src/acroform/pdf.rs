use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

use super::text::{encode_win_ansi, escape_literal};
use super::{FormDocument, FormError};

const DEFAULT_APPEARANCE: &str = "/Helv 0 Tf 0 g";
const MAX_AUTO_FONT_SIZE: f32 = 12.0;
const MIN_FONT_SIZE: f32 = 4.0;
const PADDING: f32 = 2.0;
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
struct FieldEntry {
    id: ObjectId,
    field_type: Option<Vec<u8>>,
    appearance: Option<String>,
    widgets: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    field_type: Option<Vec<u8>>,
    appearance: Option<String>,
}

/// Default-appearance (`/DA`) string split into its parts.
#[derive(Debug, Clone, PartialEq)]
struct Appearance {
    font: String,
    size: f32,
    color: String,
}

/// AcroForm document backed by `lopdf`.
pub struct PdfForm {
    doc: Document,
    fields: BTreeMap<String, FieldEntry>,
}

impl PdfForm {
    pub fn load(bytes: &[u8]) -> Result<Self, FormError> {
        let doc = Document::load_mem(bytes).map_err(|e| FormError::Load(e.to_string()))?;
        let fields = collect_fields(&doc)?;
        Ok(Self { doc, fields })
    }

    /// Current `/V` of a field, decoded.
    #[cfg(test)]
    fn field_value(&self, name: &str) -> Option<String> {
        let entry = self.fields.get(name)?;
        let dict = self.doc.get_dictionary(entry.id).ok()?;
        dict.get(b"V").ok().and_then(text_of)
    }

    fn acroform_resources(&self) -> Dictionary {
        let Ok(catalog) = catalog(&self.doc) else {
            return Dictionary::new();
        };
        catalog
            .get(b"AcroForm")
            .ok()
            .and_then(|obj| resolve_dict(&self.doc, obj).ok())
            .and_then(|form| form.get(b"DR").ok())
            .and_then(|dr| resolve_dict(&self.doc, dr).ok())
            .cloned()
            .unwrap_or_default()
    }

    /// Resources for an appearance stream, guaranteeing `font` is defined.
    fn appearance_resources(&mut self, font: &str) -> Result<Dictionary, FormError> {
        let mut resources = self.acroform_resources();
        let mut fonts = match resources.get(b"Font") {
            Ok(obj) => resolve_dict(&self.doc, obj)?.clone(),
            Err(_) => Dictionary::new(),
        };
        if !fonts.has(font.as_bytes()) {
            let helvetica = self.doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.as_bytes().to_vec(), helvetica);
        }
        resources.set("Font", fonts);
        Ok(resources)
    }

    fn widget_rect(&self, widget_id: ObjectId) -> Result<[f32; 4], FormError> {
        let widget = self.doc.get_dictionary(widget_id)?;
        let rect = widget
            .get(b"Rect")
            .map_err(|_| FormError::Malformed("widget without rectangle".into()))?;
        rect_of(&self.doc, rect)
    }

    fn write_appearance(
        &mut self,
        widget_id: ObjectId,
        rect: [f32; 4],
        encoded: &[u8],
        appearance: &Appearance,
        resources: &Dictionary,
    ) -> Result<(), FormError> {
        let width = (rect[2] - rect[0]).abs();
        let height = (rect[3] - rect[1]).abs();

        let size = if appearance.size > 0.0 {
            appearance.size
        } else {
            (height * 0.7).clamp(MIN_FONT_SIZE, MAX_AUTO_FONT_SIZE)
        };
        let baseline = ((height - size) / 2.0 + size * 0.22).max(PADDING / 2.0);

        let mut content = format!(
            "/Tx BMC\nq\n{PADDING} {PADDING} {:.2} {:.2} re W n\nBT\n/{} {size:.2} Tf\n{}\n{PADDING} {baseline:.2} Td\n(",
            (width - 2.0 * PADDING).max(0.0),
            (height - 2.0 * PADDING).max(0.0),
            appearance.font,
            appearance.color,
        )
        .into_bytes();
        content.extend(escape_literal(encoded));
        content.extend_from_slice(b") Tj\nET\nQ\nEMC\n");

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ],
                "Resources" => resources.clone(),
            },
            content,
        );
        let stream_id = self.doc.add_object(stream);

        let widget = self.doc.get_dictionary_mut(widget_id)?;
        widget.set("AP", dictionary! { "N" => stream_id });
        Ok(())
    }

    fn flatten_page(
        &mut self,
        page_id: ObjectId,
        widgets: &BTreeSet<ObjectId>,
    ) -> Result<(), FormError> {
        let annots = {
            let page = self.doc.get_dictionary(page_id)?;
            match page.get(b"Annots") {
                Ok(obj) => resolve_array(&self.doc, obj)?.clone(),
                Err(_) => return Ok(()),
            }
        };

        let mut keep = Vec::new();
        let mut draw = Vec::new();
        for annot in annots {
            let Ok(id) = annot.as_reference() else {
                keep.push(annot);
                continue;
            };
            if !widgets.contains(&id) {
                keep.push(annot);
                continue;
            }
            let widget = self.doc.get_dictionary(id)?;
            if let Some(stream_id) = normal_appearance(&self.doc, widget) {
                let rect = rect_of(&self.doc, widget.get(b"Rect")?)?;
                draw.push((stream_id, rect));
            }
        }

        if !draw.is_empty() {
            let mut ops = Vec::new();
            let mut xobjects = Vec::new();
            for (i, (stream_id, rect)) in draw.into_iter().enumerate() {
                let name = format!("FlatField{i}");
                ops.extend(
                    format!(
                        "q 1 0 0 1 {:.2} {:.2} cm /{name} Do Q\n",
                        rect[0].min(rect[2]),
                        rect[1].min(rect[3]),
                    )
                    .into_bytes(),
                );
                xobjects.push((name, stream_id));
            }
            self.add_page_xobjects(page_id, xobjects)?;
            self.append_page_content(page_id, ops)?;
        }

        let page = self.doc.get_dictionary_mut(page_id)?;
        if keep.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", Object::Array(keep));
        }
        Ok(())
    }

    fn add_page_xobjects(
        &mut self,
        page_id: ObjectId,
        xobjects: Vec<(String, ObjectId)>,
    ) -> Result<(), FormError> {
        // Resources may be inherited or shared with other pages; the page gets its own copy.
        let mut resources = inherited_resources(&self.doc, page_id)?.unwrap_or_default();
        let mut dict = match resources.get(b"XObject") {
            Ok(obj) => resolve_dict(&self.doc, obj)?.clone(),
            Err(_) => Dictionary::new(),
        };
        for (name, stream_id) in xobjects {
            dict.set(name.into_bytes(), stream_id);
        }
        resources.set("XObject", dict);
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Resources", resources);
        Ok(())
    }

    /// Wrap the existing content in `q`/`Q` and append `ops` after it.
    fn append_page_content(&mut self, page_id: ObjectId, ops: Vec<u8>) -> Result<(), FormError> {
        let existing = {
            let page = self.doc.get_dictionary(page_id)?;
            match page.get(b"Contents") {
                Ok(Object::Array(items)) => items.clone(),
                Ok(Object::Reference(id)) => match self.doc.get_object(*id)? {
                    Object::Array(items) => items.clone(),
                    _ => vec![Object::Reference(*id)],
                },
                _ => Vec::new(),
            }
        };

        let open = self
            .doc
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut closing = b"Q\n".to_vec();
        closing.extend(ops);
        let close = self.doc.add_object(Stream::new(Dictionary::new(), closing));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(open));
        contents.extend(existing);
        contents.push(Object::Reference(close));

        self.doc
            .get_dictionary_mut(page_id)?
            .set("Contents", Object::Array(contents));
        Ok(())
    }
}

impl FormDocument for PdfForm {
    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn set_text(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let entry = self
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| FormError::UnknownField(name.to_string()))?;

        if entry.field_type.as_deref() != Some(b"Tx".as_slice()) {
            return Err(FormError::IncompatibleField {
                name: name.to_string(),
                field_type: entry
                    .field_type
                    .as_deref()
                    .map(|t| String::from_utf8_lossy(t).into_owned())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }

        // Every widget must be drawable before the field changes at all.
        let rects = entry
            .widgets
            .iter()
            .map(|&widget| self.widget_rect(widget).map(|rect| (widget, rect)))
            .collect::<Result<Vec<_>, _>>()?;

        let encoded = encode_win_ansi(value);
        let appearance = parse_appearance(
            entry.appearance.as_deref().unwrap_or(DEFAULT_APPEARANCE),
        );
        let resources = self.appearance_resources(&appearance.font)?;
        for (widget, rect) in rects {
            self.write_appearance(widget, rect, &encoded, &appearance, &resources)?;
        }

        self.doc
            .get_dictionary_mut(entry.id)?
            .set("V", Object::String(encoded, StringFormat::Literal));
        Ok(())
    }

    fn flatten(&mut self) -> Result<(), FormError> {
        let widgets: BTreeSet<ObjectId> = self
            .fields
            .values()
            .flat_map(|f| f.widgets.iter().copied())
            .collect();

        let pages: Vec<ObjectId> = self.doc.get_pages().into_values().collect();
        for page_id in pages {
            self.flatten_page(page_id, &widgets)?;
        }

        let root = catalog_id(&self.doc)?;
        self.doc.get_dictionary_mut(root)?.remove(b"AcroForm");
        self.fields.clear();
        Ok(())
    }

    fn save(&mut self) -> Result<Vec<u8>, FormError> {
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| FormError::Save(e.to_string()))?;
        Ok(buf)
    }
}

fn catalog_id(doc: &Document) -> Result<ObjectId, FormError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| FormError::Malformed("missing document catalog".into()))
}

fn catalog(doc: &Document) -> Result<&Dictionary, FormError> {
    Ok(doc.get_dictionary(catalog_id(doc)?)?)
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Dictionary, FormError> {
    match obj {
        Object::Reference(id) => Ok(doc.get_dictionary(*id)?),
        Object::Dictionary(dict) => Ok(dict),
        _ => Err(FormError::Malformed("expected a dictionary".into())),
    }
}

fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Vec<Object>, FormError> {
    match obj {
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => Ok(items),
            _ => Err(FormError::Malformed("expected an array".into())),
        },
        Object::Array(items) => Ok(items),
        _ => Err(FormError::Malformed("expected an array".into())),
    }
}

fn number_of(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn rect_of(doc: &Document, obj: &Object) -> Result<[f32; 4], FormError> {
    let items = resolve_array(doc, obj)?;
    let numbers: Vec<f32> = items.iter().filter_map(number_of).collect();
    match numbers.as_slice() {
        [x1, y1, x2, y2] => Ok([*x1, *y1, *x2, *y2]),
        _ => Err(FormError::Malformed("widget rectangle".into())),
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise PDFDocEncoding/Latin-1).
fn text_of(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if let [0xFE, 0xFF, rest @ ..] = bytes.as_slice() {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}

fn name_of(obj: &Object) -> Option<Vec<u8>> {
    match obj {
        Object::Name(name) => Some(name.clone()),
        _ => None,
    }
}

fn parse_appearance(da: &str) -> Appearance {
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let mut font = "Helv".to_string();
    let mut size = 0.0;
    let mut color = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        if i + 2 < tokens.len() && tokens[i + 2] == "Tf" && tokens[i].starts_with('/') {
            font = tokens[i].trim_start_matches('/').to_string();
            size = tokens[i + 1].parse().unwrap_or(0.0);
            i += 3;
        } else {
            color.push(tokens[i]);
            i += 1;
        }
    }

    let color = if color.is_empty() {
        "0 g".to_string()
    } else {
        color.join(" ")
    };
    Appearance { font, size, color }
}

fn normal_appearance(doc: &Document, widget: &Dictionary) -> Option<ObjectId> {
    let ap = resolve_dict(doc, widget.get(b"AP").ok()?).ok()?;
    match ap.get(b"N").ok()? {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(_) => Some(*id),
            Object::Dictionary(states) => appearance_state(widget, states),
            _ => None,
        },
        Object::Dictionary(states) => appearance_state(widget, states),
        _ => None,
    }
}

/// Pick the stream for the widget's current `/AS` state (checkboxes, radios).
fn appearance_state(widget: &Dictionary, states: &Dictionary) -> Option<ObjectId> {
    let state = name_of(widget.get(b"AS").ok()?)?;
    states.get(&state).ok()?.as_reference().ok()
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Option<Dictionary>, FormError> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(current)?;
        if let Ok(resources) = node.get(b"Resources") {
            return Ok(Some(resolve_dict(doc, resources)?.clone()));
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return Ok(None),
        }
    }
    Err(FormError::Malformed("page tree too deep".into()))
}

fn collect_fields(doc: &Document) -> Result<BTreeMap<String, FieldEntry>, FormError> {
    let mut fields = BTreeMap::new();
    let Ok(form_obj) = catalog(doc)?.get(b"AcroForm") else {
        return Ok(fields);
    };
    let form = resolve_dict(doc, form_obj)?;

    let root = Inherited {
        field_type: None,
        appearance: form.get(b"DA").ok().and_then(text_of),
    };
    let roots: Vec<ObjectId> = match form.get(b"Fields") {
        Ok(obj) => resolve_array(doc, obj)?
            .iter()
            .filter_map(|o| o.as_reference().ok())
            .collect(),
        Err(_) => Vec::new(),
    };

    for id in roots {
        walk_field(doc, id, None, &root, &mut fields, 0)?;
    }
    Ok(fields)
}

fn walk_field(
    doc: &Document,
    id: ObjectId,
    parent_name: Option<&str>,
    parent: &Inherited,
    fields: &mut BTreeMap<String, FieldEntry>,
    depth: usize,
) -> Result<(), FormError> {
    if depth > MAX_TREE_DEPTH {
        return Err(FormError::Malformed("field tree too deep".into()));
    }

    let dict = doc.get_dictionary(id)?;
    let partial = dict.get(b"T").ok().and_then(text_of);
    let name = match (parent_name, partial) {
        (Some(p), Some(t)) => Some(format!("{p}.{t}")),
        (None, Some(t)) => Some(t),
        (p, None) => p.map(str::to_string),
    };
    let inherited = Inherited {
        field_type: dict
            .get(b"FT")
            .ok()
            .and_then(name_of)
            .or_else(|| parent.field_type.clone()),
        appearance: dict
            .get(b"DA")
            .ok()
            .and_then(text_of)
            .or_else(|| parent.appearance.clone()),
    };

    let kids: Vec<ObjectId> = match dict.get(b"Kids") {
        Ok(obj) => resolve_array(doc, obj)?
            .iter()
            .filter_map(|o| o.as_reference().ok())
            .collect(),
        Err(_) => Vec::new(),
    };

    // Kids carrying /T are sub-fields; the rest are this field's widgets.
    let mut field_kids = Vec::new();
    let mut widget_kids = Vec::new();
    for kid in kids {
        if doc.get_dictionary(kid)?.has(b"T") {
            field_kids.push(kid);
        } else {
            widget_kids.push(kid);
        }
    }

    if !field_kids.is_empty() {
        for kid in field_kids {
            walk_field(doc, kid, name.as_deref(), &inherited, fields, depth + 1)?;
        }
        return Ok(());
    }

    let Some(name) = name else {
        return Ok(());
    };
    let widgets = if widget_kids.is_empty() {
        vec![id]
    } else {
        widget_kids
    };
    fields.insert(
        name,
        FieldEntry {
            id,
            field_type: inherited.field_type,
            appearance: inherited.appearance,
            widgets,
        },
    );
    Ok(())
}
