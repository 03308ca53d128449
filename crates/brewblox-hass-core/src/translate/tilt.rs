// # Tilt translation
//
// Every Tilt is one entity with three sensors (temperature, SG, Plato) on a
// shared state topic. The state payload is produced for every message.

use serde_json::{Map, Value};

use super::{
    DiscoveryConfig, DiscoveryRecord, EntityIdentity, HaComponent, StateUpdate, Translation,
    Translator, map_unit, sanitize_tilt_name, value_template,
};
use crate::message::TiltState;

pub(super) fn translate(translator: &Translator, tilt: &TiltState) -> Translation {
    let entity = EntityIdentity::tilt(&tilt.key, &sanitize_tilt_name(&tilt.name));
    let state_topic = translator.state_topic(entity.as_str());
    let label = format!("{} {}", tilt.key, tilt.name);

    let sensors = [
        ("temp_c", Some("temperature"), "temperature", Some("degC")),
        ("sg", None, "SG", None),
        ("plato", None, "Plato", Some("degP")),
    ];

    let discovery = sensors
        .into_iter()
        .map(|(suffix, device_class, title, unit)| {
            let object_id = format!("{entity}_{suffix}");
            DiscoveryRecord {
                entity: entity.clone(),
                component: HaComponent::Sensor,
                topic: translator.discovery_topic(HaComponent::Sensor, &object_id),
                config: DiscoveryConfig {
                    device_class: device_class.map(str::to_string),
                    name: format!("{label} {title}"),
                    state_topic: state_topic.clone(),
                    unit_of_measurement: unit.map(|u| map_unit(u).to_string()),
                    value_template: value_template(suffix),
                },
            }
        })
        .collect();

    let reading = &tilt.data;
    let mut payload = Map::new();
    payload.insert("temp_c".to_string(), reading_value(reading.temperature_c));
    payload.insert("sg".to_string(), reading_value(reading.specific_gravity));
    payload.insert("plato".to_string(), reading_value(reading.plato));

    Translation {
        discovery,
        state: Some(StateUpdate {
            topic: state_topic,
            payload,
        }),
    }
}

fn reading_value(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::message::InboundMessage;
    use serde_json::json;

    fn purple() -> InboundMessage {
        InboundMessage::from_value(json!({
            "key": "tilt",
            "type": "Tilt.state",
            "name": "Purple",
            "data": {
                "temperature[degF]": 68.0,
                "temperature[degC]": 20.0,
                "specificGravity": 0.997,
                "plato[degP]": -0.781
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_tilt_discovery() {
        let translator = Translator::new(&RelayConfig::default());
        let result = translator.translate(&purple());

        let topics: Vec<_> = result.discovery.iter().map(|r| r.topic.as_str()).collect();
        assert_eq!(
            topics,
            [
                "homeassistant/sensor/tilt_Purple_temp_c/config",
                "homeassistant/sensor/tilt_Purple_sg/config",
                "homeassistant/sensor/tilt_Purple_plato/config",
            ]
        );
        assert!(result.discovery.iter().all(|r| r.entity.as_str() == "tilt_Purple"));

        let configs: Vec<_> = result
            .discovery
            .iter()
            .map(|r| serde_json::to_value(&r.config).unwrap())
            .collect();
        assert_eq!(
            configs,
            [
                json!({
                    "device_class": "temperature",
                    "name": "tilt Purple temperature",
                    "state_topic": "homeassistant/brewblox/tilt_Purple/state",
                    "unit_of_measurement": "°C",
                    "value_template": "{{ value_json.temp_c }}"
                }),
                json!({
                    "name": "tilt Purple SG",
                    "state_topic": "homeassistant/brewblox/tilt_Purple/state",
                    "value_template": "{{ value_json.sg }}"
                }),
                json!({
                    "name": "tilt Purple Plato",
                    "state_topic": "homeassistant/brewblox/tilt_Purple/state",
                    "unit_of_measurement": "°P",
                    "value_template": "{{ value_json.plato }}"
                }),
            ]
        );
    }

    #[test]
    fn test_tilt_state() {
        let translator = Translator::new(&RelayConfig::default());
        let state = translator.translate(&purple()).state.unwrap();

        assert_eq!(state.topic, "homeassistant/brewblox/tilt_Purple/state");
        assert_eq!(
            Value::Object(state.payload),
            json!({"temp_c": 20.0, "sg": 0.997, "plato": -0.781})
        );
    }

    #[test]
    fn test_tilt_name_is_sanitized_with_underscores() {
        let translator = Translator::new(&RelayConfig::default());
        let msg = InboundMessage::from_value(json!({
            "key": "tilt",
            "type": "Tilt.state",
            "name": "Red #2",
            "data": {}
        }))
        .unwrap();

        let result = translator.translate(&msg);
        assert_eq!(result.discovery[0].entity.as_str(), "tilt_Red__2");
        assert_eq!(
            Value::Object(result.state.unwrap().payload),
            json!({"temp_c": null, "sg": null, "plato": null})
        );
    }
}
