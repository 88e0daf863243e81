//! Object classes produced by the three detection models
//!
//! The detector runs a general street model, a traffic-light model and a
//! zebra-crossing model. Each numbers its classes independently, so a
//! class id only means something together with its source model.

use serde::{Deserialize, Serialize};

/// Model that produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    #[serde(alias = "yolo")]
    General,
    #[serde(alias = "lights")]
    TrafficLight,
    Zebra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    GreenLight,
    RedLight,
    YellowLight,
    ZebraCrossing,
}

impl ObjectClass {
    /// Map a model-local class id; classes we do not narrate yield `None`
    pub fn from_model(source: ModelSource, class_id: u32) -> Option<Self> {
        use ObjectClass::*;
        match (source, class_id) {
            (ModelSource::General, 0) => Some(Person),
            (ModelSource::General, 1) => Some(Bicycle),
            (ModelSource::General, 2) => Some(Car),
            (ModelSource::General, 3) => Some(Motorcycle),
            (ModelSource::General, 5) => Some(Bus),
            (ModelSource::General, 7) => Some(Truck),
            (ModelSource::TrafficLight, 2) => Some(GreenLight),
            (ModelSource::TrafficLight, 3) => Some(RedLight),
            (ModelSource::TrafficLight, 4) => Some(YellowLight),
            (ModelSource::Zebra, 8) => Some(ZebraCrossing),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Person => "Person",
            ObjectClass::Bicycle => "Bicycle",
            ObjectClass::Car => "Car",
            ObjectClass::Motorcycle => "Motorcycle",
            ObjectClass::Bus => "Bus",
            ObjectClass::Truck => "Truck",
            ObjectClass::GreenLight => "Green Light",
            ObjectClass::RedLight => "Red Light",
            ObjectClass::YellowLight => "Yellow Light",
            ObjectClass::ZebraCrossing => "Zebra Crossing",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ObjectClass::Person => "People",
            ObjectClass::Bicycle => "Bicycles",
            ObjectClass::Car => "Cars",
            ObjectClass::Motorcycle => "Motorcycles",
            ObjectClass::Bus => "Buses",
            ObjectClass::Truck => "Trucks",
            ObjectClass::GreenLight => "Green Lights",
            ObjectClass::RedLight => "Red Lights",
            ObjectClass::YellowLight => "Yellow Lights",
            ObjectClass::ZebraCrossing => "Zebra Crossings",
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(
            self,
            ObjectClass::Car
                | ObjectClass::Bus
                | ObjectClass::Truck
                | ObjectClass::Motorcycle
                | ObjectClass::Bicycle
        )
    }

    pub fn is_traffic_light(&self) -> bool {
        matches!(
            self,
            ObjectClass::GreenLight | ObjectClass::RedLight | ObjectClass::YellowLight
        )
    }
}
