//! XML scene format.
//!
//! ```xml
//! <scene>
//!   <entity id="1" sync="true">
//!     <component type="EC_Name" typeId="26" sync="true">
//!       <attribute value="Door" id="name" name="name"/>
//!     </component>
//!     <entity id="2" sync="true">...</entity>
//!   </entity>
//! </scene>
//! ```
//!
//! Nested `<entity>` elements are children of the enclosing entity. Attributes
//! of dynamic components carry a `type` with the attribute type name.

use std::path::Path;

use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::change::AttributeChange;
use crate::desc::{AttributeDesc, ComponentDesc, EntityDesc, SceneDesc};
use crate::entity::MAX_HIERARCHY_DEPTH;
use crate::id::EntityId;
use crate::scene::{entity_desc, Scene};
use crate::SceneError;

const SCENE: &[u8] = b"scene";
const ENTITY: &[u8] = b"entity";
const COMPONENT: &[u8] = b"component";
const ATTRIBUTE: &[u8] = b"attribute";

fn xml_error(e: impl std::fmt::Display) -> SceneError {
    SceneError::Xml { details: e.to_string() }
}

fn malformed(details: &str) -> SceneError {
    SceneError::Xml {
        details: details.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a whole XML document into a description.
///
/// The document must have a `<scene>` root. Unknown elements are ignored.
pub fn parse_scene_desc(xml: &str) -> Result<SceneDesc, SceneError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut desc = SceneDesc::default();
    let mut in_scene = false;
    let mut saw_scene = false;
    let mut open: Vec<EntityDesc> = Vec::new();
    let mut component: Option<ComponentDesc> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        let (element, empty) = match &event {
            Event::Start(e) => (Some(e), false),
            Event::Empty(e) => (Some(e), true),
            _ => (None, false),
        };

        if let Some(e) = element {
            match e.name().as_ref() {
                SCENE => {
                    if saw_scene {
                        return Err(malformed("more than one <scene> element"));
                    }
                    saw_scene = true;
                    in_scene = !empty;
                }
                ENTITY => {
                    if !in_scene || component.is_some() {
                        return Err(malformed("<entity> outside of <scene>"));
                    }
                    if open.len() >= MAX_HIERARCHY_DEPTH {
                        tracing::error!(limit = MAX_HIERARCHY_DEPTH, "xml scene nests entities too deeply");
                        return Err(SceneError::HierarchyTooDeep {
                            limit: MAX_HIERARCHY_DEPTH,
                        });
                    }
                    open.push(parse_entity(e.attributes())?);
                    if empty {
                        close_entity(&mut open, &mut desc)?;
                    }
                }
                COMPONENT => {
                    if open.is_empty() || component.is_some() {
                        return Err(malformed("<component> outside of <entity>"));
                    }
                    let comp = parse_component(e.attributes())?;
                    if empty {
                        if let Some(entity) = open.last_mut() {
                            entity.components.push(comp);
                        }
                    } else {
                        component = Some(comp);
                    }
                }
                ATTRIBUTE => {
                    let Some(comp) = component.as_mut() else {
                        return Err(malformed("<attribute> outside of <component>"));
                    };
                    comp.attributes.push(parse_attribute(e.attributes())?);
                }
                other => {
                    tracing::debug!(element = %String::from_utf8_lossy(other), "ignoring unknown element");
                }
            }
            continue;
        }

        match event {
            Event::End(e) => match e.name().as_ref() {
                SCENE => in_scene = false,
                ENTITY => close_entity(&mut open, &mut desc)?,
                COMPONENT => {
                    if let (Some(comp), Some(entity)) = (component.take(), open.last_mut()) {
                        entity.components.push(comp);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_scene {
        return Err(malformed("missing <scene> root element"));
    }
    if in_scene || !open.is_empty() || component.is_some() {
        return Err(malformed("unexpected end of document"));
    }
    Ok(desc)
}

/// Parse a single `<component>` element and its attributes, as written by
/// [`write_component_desc`].
pub fn parse_component_desc(xml: &str) -> Result<ComponentDesc, SceneError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut component: Option<ComponentDesc> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == COMPONENT && component.is_none() => {
                component = Some(parse_component(e.attributes())?);
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == ATTRIBUTE => {
                let Some(comp) = component.as_mut() else {
                    return Err(malformed("<attribute> outside of <component>"));
                };
                comp.attributes.push(parse_attribute(e.attributes())?);
            }
            Event::Start(e) | Event::Empty(e) => {
                return Err(malformed(&format!(
                    "unexpected <{}> in component document",
                    String::from_utf8_lossy(e.name().as_ref())
                )));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    component.ok_or_else(|| malformed("missing <component> element"))
}

fn close_entity(open: &mut Vec<EntityDesc>, desc: &mut SceneDesc) -> Result<(), SceneError> {
    let entity = open.pop().ok_or_else(|| malformed("unbalanced </entity>"))?;
    match open.last_mut() {
        Some(parent) => parent.children.push(entity),
        None => desc.entities.push(entity),
    }
    Ok(())
}

fn attribute_map(attrs: Attributes<'_>) -> Result<Vec<(String, String)>, SceneError> {
    attrs
        .map(|a| {
            let a = a.map_err(xml_error)?;
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a.unescape_value().map_err(xml_error)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn lookup<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn parse_flag(attrs: &[(String, String)], key: &str, default: bool) -> bool {
    match lookup(attrs, key).map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
        _ => default,
    }
}

fn parse_number(attrs: &[(String, String)], key: &str) -> Result<u32, SceneError> {
    match lookup(attrs, key) {
        None => Ok(0),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| malformed(&format!("invalid {key} \"{v}\""))),
    }
}

fn parse_entity(attrs: Attributes<'_>) -> Result<EntityDesc, SceneError> {
    let attrs = attribute_map(attrs)?;
    Ok(EntityDesc {
        id: parse_number(&attrs, "id")?,
        sync: parse_flag(&attrs, "sync", true),
        temporary: parse_flag(&attrs, "temporary", false),
        components: Vec::new(),
        children: Vec::new(),
    })
}

fn parse_component(attrs: Attributes<'_>) -> Result<ComponentDesc, SceneError> {
    let attrs = attribute_map(attrs)?;
    Ok(ComponentDesc {
        type_id: parse_number(&attrs, "typeId")?,
        type_name: lookup(&attrs, "type").unwrap_or_default().to_owned(),
        name: lookup(&attrs, "name").unwrap_or_default().to_owned(),
        sync: parse_flag(&attrs, "sync", true),
        temporary: parse_flag(&attrs, "temporary", false),
        attributes: Vec::new(),
    })
}

fn parse_attribute(attrs: Attributes<'_>) -> Result<AttributeDesc, SceneError> {
    let attrs = attribute_map(attrs)?;
    let name = lookup(&attrs, "name").unwrap_or_default();
    let id = lookup(&attrs, "id").unwrap_or(name);
    if id.is_empty() {
        return Err(malformed("<attribute> without id or name"));
    }
    Ok(AttributeDesc {
        id: id.to_owned(),
        name: (if name.is_empty() { id } else { name }).to_owned(),
        type_name: lookup(&attrs, "type").unwrap_or_default().to_owned(),
        value: lookup(&attrs, "value").unwrap_or_default().to_owned(),
        typed: None,
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Render a description as an indented XML document. `temporary` flags are
/// written only with `write_temporary`.
pub fn write_scene_desc(desc: &SceneDesc, write_temporary: bool) -> Result<String, SceneError> {
    if desc.depth() > MAX_HIERARCHY_DEPTH {
        return Err(SceneError::HierarchyTooDeep {
            limit: MAX_HIERARCHY_DEPTH,
        });
    }
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Start(BytesStart::new("scene")))
        .map_err(xml_error)?;
    for entity in &desc.entities {
        write_entity(&mut writer, entity, write_temporary)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("scene")))
        .map_err(xml_error)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn flag(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

fn write_entity(writer: &mut Writer<Vec<u8>>, entity: &EntityDesc, write_temporary: bool) -> Result<(), SceneError> {
    let id = entity.id.to_string();
    let mut start = BytesStart::new("entity");
    start.push_attribute(("id", id.as_str()));
    start.push_attribute(("sync", flag(entity.sync)));
    if write_temporary {
        start.push_attribute(("temporary", flag(entity.temporary)));
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;

    for comp in &entity.components {
        write_component(writer, comp, write_temporary)?;
    }

    for child in &entity.children {
        write_entity(writer, child, write_temporary)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("entity")))
        .map_err(xml_error)?;
    Ok(())
}

/// Render one component as a standalone `<component>` element.
pub fn write_component_desc(comp: &ComponentDesc, write_temporary: bool) -> Result<String, SceneError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_component(&mut writer, comp, write_temporary)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn write_component(writer: &mut Writer<Vec<u8>>, comp: &ComponentDesc, write_temporary: bool) -> Result<(), SceneError> {
    let type_id = comp.type_id.to_string();
    let mut start = BytesStart::new("component");
    start.push_attribute(("type", comp.type_name.as_str()));
    start.push_attribute(("typeId", type_id.as_str()));
    if !comp.name.is_empty() {
        start.push_attribute(("name", comp.name.as_str()));
    }
    start.push_attribute(("sync", flag(comp.sync)));
    if write_temporary {
        start.push_attribute(("temporary", flag(comp.temporary)));
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    for attr in &comp.attributes {
        let mut elem = BytesStart::new("attribute");
        elem.push_attribute(("value", attr.value.as_str()));
        elem.push_attribute(("id", attr.id.as_str()));
        elem.push_attribute(("name", attr.name.as_str()));
        if !attr.type_name.is_empty() {
            elem.push_attribute(("type", attr.type_name.as_str()));
        }
        writer.write_event(Event::Empty(elem)).map_err(xml_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("component")))
        .map_err(xml_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scene integration
// ---------------------------------------------------------------------------

impl Scene {
    pub fn serialize_to_xml_string(&self, serialize_temporary: bool, serialize_local: bool) -> Result<String, SceneError> {
        write_scene_desc(&self.to_scene_desc(serialize_temporary, serialize_local), serialize_temporary)
    }

    pub fn serialize_entity_to_xml_string(
        &self,
        id: EntityId,
        serialize_temporary: bool,
        serialize_children: bool,
    ) -> Result<String, SceneError> {
        let entity = self.entity(id).ok_or(SceneError::EntityNotFound { entity: id })?;
        let desc = SceneDesc {
            filename: String::new(),
            entities: vec![entity_desc(&entity, serialize_temporary, true, serialize_children)],
        };
        write_scene_desc(&desc, serialize_temporary)
    }

    pub fn create_scene_desc_from_xml(&self, xml: &str) -> Result<SceneDesc, SceneError> {
        parse_scene_desc(xml)
    }

    /// Parse `xml` completely, then instantiate it.
    pub fn create_content_from_xml(
        &mut self,
        xml: &str,
        use_entity_ids_from_file: bool,
        change: AttributeChange,
    ) -> Result<Vec<EntityId>, SceneError> {
        let desc = parse_scene_desc(xml)?;
        self.create_content_from_scene_desc(&desc, use_entity_ids_from_file, change)
    }

    pub fn save_scene_xml(
        &self,
        path: impl AsRef<Path>,
        serialize_temporary: bool,
        serialize_local: bool,
    ) -> Result<(), SceneError> {
        let path = path.as_ref();
        let xml = self.serialize_to_xml_string(serialize_temporary, serialize_local)?;
        std::fs::write(path, xml)?;
        tracing::info!(scene = %self.name(), path = %path.display(), entities = self.len(), "saved scene xml");
        Ok(())
    }

    /// Load an XML scene file. The file is parsed before the scene is
    /// cleared, so a malformed file leaves the scene untouched.
    pub fn load_scene_xml(
        &mut self,
        path: impl AsRef<Path>,
        clear_scene: bool,
        use_entity_ids_from_file: bool,
        change: AttributeChange,
    ) -> Result<Vec<EntityId>, SceneError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut desc = parse_scene_desc(&text)?;
        desc.filename = path.display().to_string();
        if clear_scene {
            self.remove_all_entities(true, change);
        }
        let ids = self.create_content_from_scene_desc(&desc, use_entity_ids_from_file, change)?;
        tracing::info!(scene = %self.name(), path = %path.display(), entities = ids.len(), "loaded scene xml");
        Ok(ids)
    }
}
