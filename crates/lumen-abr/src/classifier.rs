#![forbid(unsafe_code)]

use web_time::Instant;

use crate::{ClassifierOptions, ConnectivityReading, EffectiveType, NetworkClass, NetworkSample};

/// Converts raw connectivity readings into a [`NetworkClass`].
///
/// Rules run from the best class down and the first match wins, so a high
/// downlink decides the class as long as its effective-type gate passes.
#[derive(Clone, Debug, Default)]
pub struct NetworkQualityClassifier {
    opts: ClassifierOptions,
}

impl NetworkQualityClassifier {
    pub fn new(opts: ClassifierOptions) -> Self {
        Self { opts }
    }

    pub fn classify(
        &self,
        downlink_mbps: f64,
        round_trip_ms: f64,
        effective_type: EffectiveType,
        at: Instant,
    ) -> NetworkSample {
        NetworkSample {
            class: self.class_for(downlink_mbps, effective_type),
            downlink_mbps,
            round_trip_ms,
            sampled_at: at,
        }
    }

    /// Classify a probe reading; `None` means the platform has no connectivity API.
    pub fn classify_reading(&self, reading: Option<ConnectivityReading>, at: Instant) -> NetworkSample {
        match reading {
            Some(r) => self.classify(r.downlink_mbps, r.round_trip_ms, r.effective_type, at),
            None => {
                tracing::debug!("connectivity unavailable, classifying as unknown");
                NetworkSample::unknown(at)
            }
        }
    }

    fn class_for(&self, downlink_mbps: f64, effective_type: EffectiveType) -> NetworkClass {
        if !downlink_mbps.is_finite() || downlink_mbps <= 0.0 {
            return NetworkClass::Offline;
        }
        let fast = effective_type >= EffectiveType::G4;
        if downlink_mbps > self.opts.excellent_mbps && fast {
            NetworkClass::Excellent
        } else if downlink_mbps > self.opts.good_mbps && fast {
            NetworkClass::Good
        } else if downlink_mbps > self.opts.fair_mbps && effective_type >= EffectiveType::G3 {
            NetworkClass::Fair
        } else {
            NetworkClass::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(25.0, EffectiveType::G4, NetworkClass::Excellent)]
    #[case(10.0, EffectiveType::G4, NetworkClass::Good)]
    #[case(7.5, EffectiveType::G4, NetworkClass::Good)]
    #[case(25.0, EffectiveType::G3, NetworkClass::Fair)]
    #[case(5.0, EffectiveType::G4, NetworkClass::Fair)]
    #[case(1.5, EffectiveType::G3, NetworkClass::Fair)]
    #[case(1.5, EffectiveType::G2, NetworkClass::Poor)]
    #[case(1.0, EffectiveType::G4, NetworkClass::Poor)]
    #[case(0.0, EffectiveType::G4, NetworkClass::Offline)]
    #[case(f64::NAN, EffectiveType::G4, NetworkClass::Offline)]
    fn thresholds(
        #[case] downlink: f64,
        #[case] effective_type: EffectiveType,
        #[case] expected: NetworkClass,
    ) {
        let classifier = NetworkQualityClassifier::default();
        let sample = classifier.classify(downlink, 50.0, effective_type, Instant::now());
        assert_eq!(sample.class, expected);
    }

    #[test]
    fn unavailable_reading_is_unknown_and_decides_as_fair() {
        let classifier = NetworkQualityClassifier::default();
        let sample = classifier.classify_reading(None, Instant::now());
        assert_eq!(sample.class, NetworkClass::Unknown);
        assert_eq!(sample.class.effective(), NetworkClass::Fair);
    }

    #[test]
    fn custom_thresholds_apply() {
        let classifier =
            NetworkQualityClassifier::new(ClassifierOptions::default().with_excellent_mbps(50.0));
        let sample = classifier.classify(25.0, 20.0, EffectiveType::G4, Instant::now());
        assert_eq!(sample.class, NetworkClass::Good);
    }
}
