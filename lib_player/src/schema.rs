//! # Schema Resolver
//!
//! Turns an advertised [`Channel`] into a [`ParsedChannel`]: a decoder for the
//! channel's binary payloads plus a flattened view of its type definitions.
//!
//! Only the `protobuf` encoding is supported. The channel's schema is a
//! base64 encoded `FileDescriptorSet`; the channel's schema name selects the
//! root message type inside it. Decoding is dynamic (via `prost-reflect`), so
//! no generated code is needed for types the server invents at runtime.
//!
//! The flattened datatypes are keyed by fully-qualified type name, so two
//! schemas that both declare a nested `Header` under different packages or
//! parents do not collide.

use base64::{engine::general_purpose, Engine as _};
use prost_reflect::{DescriptorPool, DynamicMessage, Kind, MessageDescriptor, SerializeOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SchemaError;
use crate::types::Channel;

/// The single payload encoding this player can decode.
pub const SUPPORTED_ENCODING: &str = "protobuf";

/// Flattened type definitions keyed by fully-qualified type name.
pub type Datatypes = BTreeMap<String, MessageDefinition>;

/// One message type in introspection form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    pub definitions: Vec<MessageDefinitionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDefinitionField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_array: bool,
    pub is_complex: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_constant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl MessageDefinitionField {
    fn primitive(name: &str, type_name: &str, is_array: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_array,
            is_complex: false,
            is_constant: false,
            value: None,
        }
    }

    fn complex(name: &str, type_name: &str, is_array: bool) -> Self {
        Self {
            is_complex: true,
            ..Self::primitive(name, type_name, is_array)
        }
    }

    fn constant(name: &str, value: i32) -> Self {
        Self {
            is_constant: true,
            value: Some(serde_json::Value::from(value)),
            ..Self::primitive(name, "int32", false)
        }
    }
}

/// A channel whose schema resolved into a usable decoder.
#[derive(Debug, Clone)]
pub struct ParsedChannel {
    pub channel: Channel,
    /// Fully-qualified name of the root message type, without a leading dot.
    pub full_schema_name: String,
    pub datatypes: Datatypes,
    descriptor: MessageDescriptor,
}

impl ParsedChannel {
    /// Decodes one payload into a JSON value.
    ///
    /// Field names are the protobuf names, 64-bit integers stay numeric and
    /// fields holding their default value are included.
    pub fn decode(&self, data: &[u8]) -> Result<serde_json::Value, SchemaError> {
        let message = DynamicMessage::decode(self.descriptor.clone(), data)?;
        let options = SerializeOptions::new()
            .stringify_64_bit_integers(false)
            .use_proto_field_name(true)
            .skip_default_fields(false);
        let value = message.serialize_with_options(serde_json::value::Serializer, &options)?;
        Ok(value)
    }
}

/// Resolves a channel's schema. Pure: the result depends only on `channel`.
pub fn resolve(channel: &Channel) -> Result<ParsedChannel, SchemaError> {
    if channel.encoding != SUPPORTED_ENCODING {
        return Err(SchemaError::UnsupportedEncoding {
            encoding: channel.encoding.clone(),
        });
    }

    let bytes = general_purpose::STANDARD.decode(channel.schema.as_bytes())?;
    let pool = DescriptorPool::decode(bytes.as_slice())?;

    let schema_name = channel.schema_name.trim_start_matches('.');
    let descriptor = pool
        .get_message_by_name(schema_name)
        .ok_or_else(|| SchemaError::UnknownType {
            schema_name: channel.schema_name.clone(),
        })?;

    Ok(ParsedChannel {
        channel: channel.clone(),
        full_schema_name: descriptor.full_name().to_string(),
        datatypes: flatten(&descriptor),
        descriptor,
    })
}

/// Walks the root type, every type its fields reference and every nested
/// type, producing one definition per fully-qualified name.
fn flatten(root: &MessageDescriptor) -> Datatypes {
    let mut datatypes = Datatypes::new();
    let mut pending = vec![root.clone()];

    while let Some(message) = pending.pop() {
        if datatypes.contains_key(message.full_name()) {
            continue;
        }

        let mut definitions = Vec::new();
        for field in message.fields() {
            let is_array = field.is_list() || field.is_map();
            match field.kind() {
                Kind::Message(nested) => match nested.full_name() {
                    "google.protobuf.Timestamp" => {
                        definitions.push(MessageDefinitionField::primitive(field.name(), "time", is_array));
                    }
                    "google.protobuf.Duration" => {
                        definitions.push(MessageDefinitionField::primitive(field.name(), "duration", is_array));
                    }
                    type_name => {
                        definitions.push(MessageDefinitionField::complex(field.name(), type_name, is_array));
                        pending.push(nested.clone());
                    }
                },
                Kind::Enum(enumeration) => {
                    for value in enumeration.values() {
                        definitions.push(MessageDefinitionField::constant(value.name(), value.number()));
                    }
                    definitions.push(MessageDefinitionField::primitive(field.name(), "int32", is_array));
                }
                // bytes are exposed as a uint8 array
                Kind::Bytes => {
                    definitions.push(MessageDefinitionField::primitive(field.name(), "uint8", true));
                }
                scalar => {
                    definitions.push(MessageDefinitionField::primitive(
                        field.name(),
                        scalar_type_name(&scalar),
                        is_array,
                    ));
                }
            }
        }

        pending.extend(message.child_messages());
        datatypes.insert(message.full_name().to_string(), MessageDefinition { definitions });
    }

    datatypes
}

fn scalar_type_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "float64",
        Kind::Float => "float32",
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => "int32",
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => "int64",
        Kind::Uint32 | Kind::Fixed32 => "uint32",
        Kind::Uint64 | Kind::Fixed64 => "uint64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "uint8",
        Kind::Message(_) | Kind::Enum(_) => "unknown",
    }
}

/// Descriptor sets and payloads shared by the unit tests of several modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use base64::{engine::general_purpose, Engine as _};
    use prost::Message;
    use prost_reflect::{DescriptorPool, DynamicMessage, Value};
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, FileDescriptorSet,
    };

    use crate::types::Channel;

    fn field(name: &str, number: i32, kind: Type, label: Label, type_name: Option<&str>) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(label as i32),
            r#type: Some(kind as i32),
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    /// `package test;` with `Point { double x; double y; }` and
    /// `Pose { string frame_id; Point position; repeated int32 values;
    /// Level level; Inner inner; int64 stamp; }` where `Level` and `Inner`
    /// are nested in `Pose`.
    pub(crate) fn descriptor_set() -> FileDescriptorSet {
        let point = DescriptorProto {
            name: Some("Point".to_string()),
            field: vec![
                field("x", 1, Type::Double, Label::Optional, None),
                field("y", 2, Type::Double, Label::Optional, None),
            ],
            ..Default::default()
        };

        let inner = DescriptorProto {
            name: Some("Inner".to_string()),
            field: vec![field("flag", 1, Type::Bool, Label::Optional, None)],
            ..Default::default()
        };

        let level = EnumDescriptorProto {
            name: Some("Level".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("LOW".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("HIGH".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let pose = DescriptorProto {
            name: Some("Pose".to_string()),
            field: vec![
                field("frame_id", 1, Type::String, Label::Optional, None),
                field("position", 2, Type::Message, Label::Optional, Some(".test.Point")),
                field("values", 3, Type::Int32, Label::Repeated, None),
                field("level", 4, Type::Enum, Label::Optional, Some(".test.Pose.Level")),
                field("inner", 5, Type::Message, Label::Optional, Some(".test.Pose.Inner")),
                field("stamp", 6, Type::Int64, Label::Optional, None),
                field("blob", 7, Type::Bytes, Label::Optional, None),
            ],
            nested_type: vec![inner],
            enum_type: vec![level],
            ..Default::default()
        };

        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("test.proto".to_string()),
                package: Some("test".to_string()),
                syntax: Some("proto3".to_string()),
                message_type: vec![point, pose],
                ..Default::default()
            }],
        }
    }

    pub(crate) fn schema_base64() -> String {
        general_purpose::STANDARD.encode(descriptor_set().encode_to_vec())
    }

    pub(crate) fn channel(id: u32, topic: &str, schema_name: &str) -> Channel {
        Channel {
            id,
            topic: topic.to_string(),
            encoding: "protobuf".to_string(),
            schema_name: schema_name.to_string(),
            schema: schema_base64(),
        }
    }

    /// Encodes a `test.Point`.
    pub(crate) fn point_bytes(x: f64, y: f64) -> Vec<u8> {
        let pool = DescriptorPool::from_file_descriptor_set(descriptor_set()).unwrap();
        let mut point = DynamicMessage::new(pool.get_message_by_name("test.Point").unwrap());
        point.set_field_by_name("x", Value::F64(x));
        point.set_field_by_name("y", Value::F64(y));
        point.encode_to_vec()
    }

    /// Encodes a `test.Pose` with every field set.
    pub(crate) fn pose_bytes() -> Vec<u8> {
        let pool = DescriptorPool::from_file_descriptor_set(descriptor_set()).unwrap();
        let mut point = DynamicMessage::new(pool.get_message_by_name("test.Point").unwrap());
        point.set_field_by_name("x", Value::F64(1.5));
        point.set_field_by_name("y", Value::F64(-2.0));

        let mut pose = DynamicMessage::new(pool.get_message_by_name("test.Pose").unwrap());
        pose.set_field_by_name("frame_id", Value::String("map".to_string()));
        pose.set_field_by_name("position", Value::Message(point));
        pose.set_field_by_name("values", Value::List(vec![Value::I32(3), Value::I32(4)]));
        pose.set_field_by_name("level", Value::EnumNumber(1));
        pose.set_field_by_name("stamp", Value::I64(42));
        pose.encode_to_vec()
    }
}
