// # Spark translation
//
// One Spark message carries every block of one controller. All handled blocks
// are merged into a single state payload on `{prefix}/brewblox/{key}/state`,
// and each handled block yields one discovery candidate.

use serde_json::{Map, Value};
use tracing::trace;

use super::{
    DiscoveryConfig, DiscoveryRecord, EntityIdentity, HaComponent, StateUpdate, Translation,
    Translator, is_placeholder_id, map_unit, round_reading, sanitize_spark_id, value_template,
};
use crate::config::BlockKind;
use crate::message::{BlockRecord, SparkState};

pub(super) fn translate(translator: &Translator, spark: &SparkState) -> Translation {
    let device = spark.key.as_str();
    let state_topic = translator.state_topic(device);

    let mut payload = Map::new();
    let mut discovery = Vec::new();

    for block in &spark.data.blocks {
        let kind = translator.handled_types().classify(&block.block_type);
        if kind == BlockKind::Other {
            continue;
        }

        if is_placeholder_id(&block.id) {
            trace!("Skipping generated block {} on {}", block.id, device);
            continue;
        }

        let field = sanitize_spark_id(&block.id);
        let (component, value, config) = match kind {
            BlockKind::Sensor => temperature(block, "value", &field, device, &state_topic),
            BlockKind::Setpoint => temperature(block, "setting", &field, device, &state_topic),
            BlockKind::Profile => profile(block, &field, device, &state_topic),
            BlockKind::Other => continue,
        };

        let entity = EntityIdentity::spark(device, &field);
        discovery.push(DiscoveryRecord {
            topic: translator.discovery_topic(component, entity.as_str()),
            entity,
            component,
            config,
        });
        payload.insert(field, value);
    }

    let state = (!payload.is_empty()).then(|| StateUpdate {
        topic: state_topic,
        payload,
    });

    Translation { discovery, state }
}

fn temperature(
    block: &BlockRecord,
    field_name: &str,
    field: &str,
    device: &str,
    state_topic: &str,
) -> (HaComponent, Value, DiscoveryConfig) {
    let qty = block.quantity(field_name);
    let config = DiscoveryConfig {
        device_class: Some("temperature".to_string()),
        name: display_name(block, device),
        state_topic: state_topic.to_string(),
        unit_of_measurement: qty.unit.as_deref().map(|u| map_unit(u).to_string()),
        value_template: value_template(field),
    };

    (HaComponent::Sensor, round_reading(qty.value), config)
}

fn profile(
    block: &BlockRecord,
    field: &str,
    device: &str,
    state_topic: &str,
) -> (HaComponent, Value, DiscoveryConfig) {
    let running = block.quantity("setting").value.is_some();
    let config = DiscoveryConfig {
        device_class: Some("running".to_string()),
        name: display_name(block, device),
        state_topic: state_topic.to_string(),
        unit_of_measurement: None,
        value_template: value_template(field),
    };

    let state = if running { "ON" } else { "OFF" };
    (HaComponent::BinarySensor, Value::from(state), config)
}

fn display_name(block: &BlockRecord, device: &str) -> String {
    format!("{} ({})", block.id, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HandledTypes, RelayConfig};
    use crate::message::InboundMessage;
    use serde_json::json;

    fn spark(blocks: Value) -> InboundMessage {
        InboundMessage::from_value(json!({
            "key": "spark-four",
            "type": "Spark.state",
            "data": {"blocks": blocks}
        }))
        .unwrap()
    }

    fn quantity(unit: &str, value: Value) -> Value {
        json!({"__bloxtype": "Quantity", "unit": unit, "value": value})
    }

    #[test]
    fn test_sensor_block() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = spark(json!([{
            "id": "Sensor 1",
            "type": "TempSensorMock",
            "data": {"value": quantity("degC", json!(20.8799999))}
        }]));

        let result = translator.translate(&msg);
        assert_eq!(result.discovery.len(), 1);

        let record = &result.discovery[0];
        assert_eq!(record.entity.as_str(), "spark-four__Sensor1");
        assert_eq!(record.component, HaComponent::Sensor);
        assert_eq!(record.topic, "homeassistant/sensor/spark-four__Sensor1/config");
        assert_eq!(
            serde_json::to_value(&record.config).unwrap(),
            json!({
                "device_class": "temperature",
                "name": "Sensor 1 (spark-four)",
                "state_topic": "homeassistant/brewblox/spark-four/state",
                "unit_of_measurement": "°C",
                "value_template": "{{ value_json.Sensor1 }}"
            })
        );

        let state = result.state.unwrap();
        assert_eq!(state.topic, "homeassistant/brewblox/spark-four/state");
        assert_eq!(Value::Object(state.payload), json!({"Sensor1": 20.88}));
    }

    #[test]
    fn test_null_sensor_value() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = spark(json!([{
            "id": "Sensor 2",
            "type": "TempSensorOneWire",
            "data": {"value": quantity("degF", Value::Null)}
        }]));

        let result = translator.translate(&msg);
        assert_eq!(result.discovery[0].config.name, "Sensor 2 (spark-four)");
        assert_eq!(
            result.discovery[0].config.unit_of_measurement.as_deref(),
            Some("°F")
        );
        assert_eq!(
            Value::Object(result.state.unwrap().payload),
            json!({"Sensor2": null})
        );
    }

    #[test]
    fn test_setpoint_reads_setting() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = spark(json!([{
            "id": "Beer Setpoint",
            "type": "SetpointSensorPair",
            "data": {
                "value": quantity("degC", json!(19.0)),
                "setting": quantity("kPa", json!(20.004))
            }
        }]));

        let result = translator.translate(&msg);
        assert_eq!(result.discovery[0].topic, "homeassistant/sensor/spark-four__BeerSetpoint/config");
        assert_eq!(
            result.discovery[0].config.unit_of_measurement.as_deref(),
            Some("kPa")
        );
        assert_eq!(
            Value::Object(result.state.unwrap().payload),
            json!({"BeerSetpoint": 20.0})
        );
    }

    #[test]
    fn test_profile_block() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = spark(json!([
            {
                "id": "Profile 1",
                "type": "SetpointProfile",
                "data": {"setting": quantity("degC", json!(18.0))}
            },
            {
                "id": "Profile 2",
                "type": "SetpointProfile",
                "data": {"setting": quantity("degC", Value::Null)}
            }
        ]));

        let result = translator.translate(&msg);
        assert_eq!(result.discovery.len(), 2);
        assert_eq!(result.discovery[0].component, HaComponent::BinarySensor);
        assert_eq!(
            result.discovery[0].topic,
            "homeassistant/binary_sensor/spark-four__Profile1/config"
        );
        assert_eq!(
            serde_json::to_value(&result.discovery[0].config).unwrap(),
            json!({
                "device_class": "running",
                "name": "Profile 1 (spark-four)",
                "state_topic": "homeassistant/brewblox/spark-four/state",
                "value_template": "{{ value_json.Profile1 }}"
            })
        );
        assert_eq!(
            Value::Object(result.state.unwrap().payload),
            json!({"Profile1": "ON", "Profile2": "OFF"})
        );
    }

    #[test]
    fn test_skips_unhandled_and_generated_blocks() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = spark(json!([
            {"id": "New|abc", "type": "TempSensorMock", "data": {"value": quantity("degC", json!(1.0))}},
            {"id": "Pwm", "type": "ActuatorPwm", "data": {"value": 50.0}},
            {"id": "SysInfo", "type": "SysInfo", "data": {}}
        ]));

        let result = translator.translate(&msg);
        assert!(result.is_empty());
    }

    #[test]
    fn test_handled_types_are_configurable() {
        let mut types = HandledTypes::empty();
        types.sensor.push("TempSensorAnalog".to_string());
        let translator = Translator::new(&RelayConfig::new().with_handled_types(types));

        let msg = spark(json!([
            {"id": "Analog", "type": "TempSensorAnalog", "data": {"value": quantity("degC", json!(4.0))}},
            {"id": "Mock", "type": "TempSensorMock", "data": {"value": quantity("degC", json!(5.0))}}
        ]));

        let result = translator.translate(&msg);
        assert_eq!(result.discovery.len(), 1);
        assert_eq!(result.discovery[0].entity.as_str(), "spark-four__Analog");
        assert_eq!(
            Value::Object(result.state.unwrap().payload),
            json!({"Analog": 4.0})
        );
    }

    #[test]
    fn test_missing_quantity_is_null_without_unit() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = spark(json!([{"id": "Probe", "type": "TempSensorExternal"}]));

        let result = translator.translate(&msg);
        assert_eq!(result.discovery[0].config.unit_of_measurement, None);
        assert_eq!(
            Value::Object(result.state.unwrap().payload),
            json!({"Probe": null})
        );
    }
}
