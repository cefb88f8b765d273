//! Attribute value kinds and their string/binary encodings.
//!
//! The set of kinds is closed: every attribute holds an [`AttributeValue`]
//! whose variant is fixed when the attribute is created. Kinds are identified
//! on the wire by a small integer type id and in text formats by a type name
//! (matched case-insensitively).

use glam::{EulerRot, Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{DataDeserializer, DataSerializer};
use crate::id::EntityId;
use crate::SceneError;

// ---------------------------------------------------------------------------
// AttributeKind
// ---------------------------------------------------------------------------

/// The static type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    String,
    Int,
    Real,
    Color,
    Float2,
    Float3,
    Float4,
    Bool,
    UInt,
    Quat,
    AssetReference,
    AssetReferenceList,
    EntityReference,
    Transform,
}

impl AttributeKind {
    /// Every kind, in type-id order.
    pub const ALL: [AttributeKind; 14] = [
        AttributeKind::String,
        AttributeKind::Int,
        AttributeKind::Real,
        AttributeKind::Color,
        AttributeKind::Float2,
        AttributeKind::Float3,
        AttributeKind::Float4,
        AttributeKind::Bool,
        AttributeKind::UInt,
        AttributeKind::Quat,
        AttributeKind::AssetReference,
        AttributeKind::AssetReferenceList,
        AttributeKind::EntityReference,
        AttributeKind::Transform,
    ];

    /// Numeric type id used on the wire.
    pub fn type_id(self) -> u32 {
        match self {
            AttributeKind::String => 1,
            AttributeKind::Int => 2,
            AttributeKind::Real => 3,
            AttributeKind::Color => 4,
            AttributeKind::Float2 => 5,
            AttributeKind::Float3 => 6,
            AttributeKind::Float4 => 7,
            AttributeKind::Bool => 8,
            AttributeKind::UInt => 9,
            AttributeKind::Quat => 10,
            AttributeKind::AssetReference => 11,
            AttributeKind::AssetReferenceList => 12,
            AttributeKind::EntityReference => 13,
            AttributeKind::Transform => 16,
        }
    }

    /// Type name used in text formats.
    pub fn type_name(self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Int => "int",
            AttributeKind::Real => "real",
            AttributeKind::Color => "Color",
            AttributeKind::Float2 => "float2",
            AttributeKind::Float3 => "float3",
            AttributeKind::Float4 => "float4",
            AttributeKind::Bool => "bool",
            AttributeKind::UInt => "uint",
            AttributeKind::Quat => "Quat",
            AttributeKind::AssetReference => "AssetReference",
            AttributeKind::AssetReferenceList => "AssetReferenceList",
            AttributeKind::EntityReference => "EntityReference",
            AttributeKind::Transform => "Transform",
        }
    }

    pub fn from_type_id(type_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_id() == type_id)
    }

    /// Case-insensitive lookup by type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.type_name().eq_ignore_ascii_case(name))
    }

    /// Whether values of this kind can be blended by an interpolation.
    pub fn is_interpolable(self) -> bool {
        matches!(
            self,
            AttributeKind::Int
                | AttributeKind::Real
                | AttributeKind::Color
                | AttributeKind::Float2
                | AttributeKind::Float3
                | AttributeKind::Float4
                | AttributeKind::UInt
                | AttributeKind::Quat
                | AttributeKind::Transform
        )
    }

    pub fn default_value(self) -> AttributeValue {
        match self {
            AttributeKind::String => AttributeValue::String(String::new()),
            AttributeKind::Int => AttributeValue::Int(0),
            AttributeKind::Real => AttributeValue::Real(0.0),
            AttributeKind::Color => AttributeValue::Color(Color::default()),
            AttributeKind::Float2 => AttributeValue::Float2(Vec2::ZERO),
            AttributeKind::Float3 => AttributeValue::Float3(Vec3::ZERO),
            AttributeKind::Float4 => AttributeValue::Float4(Vec4::ZERO),
            AttributeKind::Bool => AttributeValue::Bool(false),
            AttributeKind::UInt => AttributeValue::UInt(0),
            AttributeKind::Quat => AttributeValue::Quat(Quat::IDENTITY),
            AttributeKind::AssetReference => {
                AttributeValue::AssetReference(AssetReference::default())
            }
            AttributeKind::AssetReferenceList => {
                AttributeValue::AssetReferenceList(AssetReferenceList::default())
            }
            AttributeKind::EntityReference => {
                AttributeValue::EntityReference(EntityReference::default())
            }
            AttributeKind::Transform => AttributeValue::Transform(Transform::default()),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// ---------------------------------------------------------------------------
// Structured value types
// ---------------------------------------------------------------------------

/// RGBA color with float channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    fn from_vec4(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

/// Position, Euler rotation in degrees, and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub pos: Vec3,
    pub rot: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_pos(pos: Vec3) -> Self {
        Self {
            pos,
            ..Self::default()
        }
    }

    /// Rotation as a quaternion.
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.rot.x.to_radians(),
            self.rot.y.to_radians(),
            self.rot.z.to_radians(),
        )
    }

    fn euler_degrees(q: Quat) -> Vec3 {
        let (x, y, z) = q.to_euler(EulerRot::XYZ);
        Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            rot: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

/// Reference to an asset by name or URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetReference {
    pub reference: String,
    /// Optional asset type hint. Not part of the string form.
    pub type_name: String,
}

impl AssetReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            type_name: String::new(),
        }
    }
}

/// Ordered list of asset references.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetReferenceList {
    pub refs: Vec<String>,
    pub type_name: String,
}

/// Reference to another entity, either by id (numeric string) or by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityReference {
    pub reference: String,
}

impl EntityReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    pub fn from_id(id: EntityId) -> Self {
        Self::new(id.raw().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.reference.trim().is_empty()
    }

    /// The referenced id, if the reference is a non-zero number.
    pub fn as_id(&self) -> Option<EntityId> {
        self.reference
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&raw| raw != 0)
            .map(EntityId)
    }
}

// ---------------------------------------------------------------------------
// AttributeValue
// ---------------------------------------------------------------------------

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Int(i32),
    Real(f32),
    Color(Color),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Bool(bool),
    UInt(u32),
    Quat(Quat),
    AssetReference(AssetReference),
    AssetReferenceList(AssetReferenceList),
    EntityReference(EntityReference),
    Transform(Transform),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Int(_) => AttributeKind::Int,
            AttributeValue::Real(_) => AttributeKind::Real,
            AttributeValue::Color(_) => AttributeKind::Color,
            AttributeValue::Float2(_) => AttributeKind::Float2,
            AttributeValue::Float3(_) => AttributeKind::Float3,
            AttributeValue::Float4(_) => AttributeKind::Float4,
            AttributeValue::Bool(_) => AttributeKind::Bool,
            AttributeValue::UInt(_) => AttributeKind::UInt,
            AttributeValue::Quat(_) => AttributeKind::Quat,
            AttributeValue::AssetReference(_) => AttributeKind::AssetReference,
            AttributeValue::AssetReferenceList(_) => AttributeKind::AssetReferenceList,
            AttributeValue::EntityReference(_) => AttributeKind::EntityReference,
            AttributeValue::Transform(_) => AttributeKind::Transform,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_entity_reference(&self) -> Option<&EntityReference> {
        match self {
            AttributeValue::EntityReference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<&Transform> {
        match self {
            AttributeValue::Transform(t) => Some(t),
            _ => None,
        }
    }

    // -- string form --------------------------------------------------------

    /// Parse the string form of a value of `kind`.
    pub fn parse(kind: AttributeKind, s: &str) -> Result<Self, SceneError> {
        let invalid = || SceneError::InvalidAttributeValue {
            kind: kind.type_name(),
            value: s.to_owned(),
        };
        let value = match kind {
            AttributeKind::String => AttributeValue::String(s.to_owned()),
            AttributeKind::Int => AttributeValue::Int(s.trim().parse().map_err(|_| invalid())?),
            AttributeKind::Real => AttributeValue::Real(s.trim().parse().map_err(|_| invalid())?),
            AttributeKind::UInt => AttributeValue::UInt(s.trim().parse().map_err(|_| invalid())?),
            AttributeKind::Bool => AttributeValue::Bool(parse_bool(s).ok_or_else(invalid)?),
            AttributeKind::Color => {
                let [r, g, b, a] = parse_floats::<4>(s).ok_or_else(invalid)?;
                AttributeValue::Color(Color::new(r, g, b, a))
            }
            AttributeKind::Float2 => {
                AttributeValue::Float2(Vec2::from_array(parse_floats(s).ok_or_else(invalid)?))
            }
            AttributeKind::Float3 => {
                AttributeValue::Float3(Vec3::from_array(parse_floats(s).ok_or_else(invalid)?))
            }
            AttributeKind::Float4 => {
                AttributeValue::Float4(Vec4::from_array(parse_floats(s).ok_or_else(invalid)?))
            }
            AttributeKind::Quat => {
                AttributeValue::Quat(Quat::from_array(parse_floats(s).ok_or_else(invalid)?))
            }
            AttributeKind::Transform => {
                let f = parse_floats::<9>(s).ok_or_else(invalid)?;
                AttributeValue::Transform(Transform {
                    pos: Vec3::new(f[0], f[1], f[2]),
                    rot: Vec3::new(f[3], f[4], f[5]),
                    scale: Vec3::new(f[6], f[7], f[8]),
                })
            }
            AttributeKind::AssetReference => AttributeValue::AssetReference(AssetReference::new(s)),
            AttributeKind::AssetReferenceList => {
                let refs = if s.is_empty() {
                    Vec::new()
                } else {
                    s.split(';').map(str::to_owned).collect()
                };
                AttributeValue::AssetReferenceList(AssetReferenceList {
                    refs,
                    type_name: String::new(),
                })
            }
            AttributeKind::EntityReference => {
                AttributeValue::EntityReference(EntityReference::new(s))
            }
        };
        Ok(value)
    }

    /// Copy the asset type hint of `current` onto a decoded reference that
    /// carries none. Neither the string nor the binary form stores the hint.
    pub(crate) fn with_type_hint_of(mut self, current: &AttributeValue) -> Self {
        match (&mut self, current) {
            (AttributeValue::AssetReference(new), AttributeValue::AssetReference(old)) if new.type_name.is_empty() => {
                new.type_name.clone_from(&old.type_name);
            }
            (AttributeValue::AssetReferenceList(new), AttributeValue::AssetReferenceList(old))
                if new.type_name.is_empty() =>
            {
                new.type_name.clone_from(&old.type_name);
            }
            _ => {}
        }
        self
    }

    // -- binary form --------------------------------------------------------

    pub fn write_binary(&self, dest: &mut DataSerializer) -> Result<(), SceneError> {
        match self {
            AttributeValue::String(s) => dest.add_string(s)?,
            AttributeValue::Int(v) => dest.add_i32(*v),
            AttributeValue::Real(v) => dest.add_f32(*v),
            AttributeValue::Color(c) => write_floats(dest, &c.to_vec4().to_array()),
            AttributeValue::Float2(v) => write_floats(dest, &v.to_array()),
            AttributeValue::Float3(v) => write_floats(dest, &v.to_array()),
            AttributeValue::Float4(v) => write_floats(dest, &v.to_array()),
            AttributeValue::Bool(b) => dest.add_u8(u8::from(*b)),
            AttributeValue::UInt(v) => dest.add_u32(*v),
            AttributeValue::Quat(q) => write_floats(dest, &q.to_array()),
            AttributeValue::AssetReference(r) => dest.add_string(&r.reference)?,
            AttributeValue::AssetReferenceList(list) => {
                let count = u8::try_from(list.refs.len()).map_err(|_| SceneError::ListTooLong {
                    len: list.refs.len(),
                    max: u8::MAX as usize,
                })?;
                dest.add_u8(count);
                for r in &list.refs {
                    dest.add_string(r)?;
                }
            }
            AttributeValue::EntityReference(r) => dest.add_string(&r.reference)?,
            AttributeValue::Transform(t) => {
                write_floats(dest, &t.pos.to_array());
                write_floats(dest, &t.rot.to_array());
                write_floats(dest, &t.scale.to_array());
            }
        }
        Ok(())
    }

    pub fn read_binary(kind: AttributeKind, source: &mut DataDeserializer<'_>) -> Result<Self, SceneError> {
        let value = match kind {
            AttributeKind::String => AttributeValue::String(source.read_string()?),
            AttributeKind::Int => AttributeValue::Int(source.read_i32()?),
            AttributeKind::Real => AttributeValue::Real(source.read_f32()?),
            AttributeKind::Color => AttributeValue::Color(Color::from_vec4(Vec4::from_array(
                read_floats(source)?,
            ))),
            AttributeKind::Float2 => AttributeValue::Float2(Vec2::from_array(read_floats(source)?)),
            AttributeKind::Float3 => AttributeValue::Float3(Vec3::from_array(read_floats(source)?)),
            AttributeKind::Float4 => AttributeValue::Float4(Vec4::from_array(read_floats(source)?)),
            AttributeKind::Bool => AttributeValue::Bool(source.read_u8()? != 0),
            AttributeKind::UInt => AttributeValue::UInt(source.read_u32()?),
            AttributeKind::Quat => AttributeValue::Quat(Quat::from_array(read_floats(source)?)),
            AttributeKind::AssetReference => {
                AttributeValue::AssetReference(AssetReference::new(source.read_string()?))
            }
            AttributeKind::AssetReferenceList => {
                let count = source.read_u8()?;
                let mut refs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    refs.push(source.read_string()?);
                }
                AttributeValue::AssetReferenceList(AssetReferenceList {
                    refs,
                    type_name: String::new(),
                })
            }
            AttributeKind::EntityReference => {
                AttributeValue::EntityReference(EntityReference::new(source.read_string()?))
            }
            AttributeKind::Transform => {
                let pos = Vec3::from_array(read_floats(source)?);
                let rot = Vec3::from_array(read_floats(source)?);
                let scale = Vec3::from_array(read_floats(source)?);
                AttributeValue::Transform(Transform { pos, rot, scale })
            }
        };
        Ok(value)
    }

    // -- interpolation ------------------------------------------------------

    /// Blend from `self` toward `end` by `t` in `[0, 1]`.
    ///
    /// Returns `None` when the kinds differ or the kind is not interpolable.
    pub fn interpolate(&self, end: &AttributeValue, t: f32) -> Option<AttributeValue> {
        let t = t.clamp(0.0, 1.0);
        let value = match (self, end) {
            (AttributeValue::Int(a), AttributeValue::Int(b)) => {
                AttributeValue::Int(lerp_wide(f64::from(*a), f64::from(*b), t) as i32)
            }
            (AttributeValue::UInt(a), AttributeValue::UInt(b)) => {
                AttributeValue::UInt(lerp_wide(f64::from(*a), f64::from(*b), t) as u32)
            }
            (AttributeValue::Real(a), AttributeValue::Real(b)) => AttributeValue::Real(lerp(*a, *b, t)),
            (AttributeValue::Color(a), AttributeValue::Color(b)) => {
                AttributeValue::Color(Color::from_vec4(a.to_vec4().lerp(b.to_vec4(), t)))
            }
            (AttributeValue::Float2(a), AttributeValue::Float2(b)) => AttributeValue::Float2(a.lerp(*b, t)),
            (AttributeValue::Float3(a), AttributeValue::Float3(b)) => AttributeValue::Float3(a.lerp(*b, t)),
            (AttributeValue::Float4(a), AttributeValue::Float4(b)) => AttributeValue::Float4(a.lerp(*b, t)),
            (AttributeValue::Quat(a), AttributeValue::Quat(b)) => AttributeValue::Quat(a.slerp(*b, t)),
            (AttributeValue::Transform(a), AttributeValue::Transform(b)) => {
                let rot = a.orientation().slerp(b.orientation(), t);
                AttributeValue::Transform(Transform {
                    pos: a.pos.lerp(b.pos, t),
                    rot: Transform::euler_degrees(rot),
                    scale: a.scale.lerp(b.scale, t),
                })
            }
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Real(v) => write!(f, "{v}"),
            AttributeValue::Color(c) => write!(f, "{} {} {} {}", c.r, c.g, c.b, c.a),
            AttributeValue::Float2(v) => write!(f, "{} {}", v.x, v.y),
            AttributeValue::Float3(v) => write!(f, "{} {} {}", v.x, v.y, v.z),
            AttributeValue::Float4(v) => write!(f, "{} {} {} {}", v.x, v.y, v.z, v.w),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::UInt(v) => write!(f, "{v}"),
            AttributeValue::Quat(q) => write!(f, "{} {} {} {}", q.x, q.y, q.z, q.w),
            AttributeValue::AssetReference(r) => f.write_str(&r.reference),
            AttributeValue::AssetReferenceList(list) => f.write_str(&list.refs.join(";")),
            AttributeValue::EntityReference(r) => f.write_str(&r.reference),
            AttributeValue::Transform(t) => write!(
                f,
                "{} {} {} {} {} {} {} {} {}",
                t.pos.x, t.pos.y, t.pos.z, t.rot.x, t.rot.y, t.rot.z, t.scale.x, t.scale.y, t.scale.z
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Integer blend. `f64` holds every `i32`/`u32` exactly.
fn lerp_wide(a: f64, b: f64, t: f32) -> f64 {
    (a + (b - a) * f64::from(t)).round()
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") || s == "1" {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") || s == "0" {
        Some(false)
    } else {
        None
    }
}

/// Exactly `N` floats separated by whitespace and/or commas.
fn parse_floats<const N: usize>(s: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut parts = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty());
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn write_floats(dest: &mut DataSerializer, values: &[f32]) {
    for v in values {
        dest.add_f32(*v);
    }
}

fn read_floats<const N: usize>(source: &mut DataDeserializer<'_>) -> Result<[f32; N], SceneError> {
    let mut out = [0.0f32; N];
    for slot in out.iter_mut() {
        *slot = source.read_f32()?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
