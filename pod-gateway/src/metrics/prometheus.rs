//! Prometheus text-format exporter.

use std::sync::Arc;

use super::collector::MetricsCollector;

/// Renders a [`MetricsCollector`] snapshot for `/metrics`.
pub struct PrometheusExporter {
    collector: Arc<MetricsCollector>,
    namespace: String,
}

impl PrometheusExporter {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self::with_namespace(collector, "pod_gateway")
    }

    pub fn with_namespace(collector: Arc<MetricsCollector>, namespace: impl Into<String>) -> Self {
        Self {
            collector,
            namespace: namespace.into(),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let snapshot = self.collector.snapshot();
        let mut output = String::new();

        // Credentials
        self.write_counter_with_labels(
            &mut output,
            "credential_refresh_total",
            "Token acquisitions by outcome",
            &[
                (snapshot.credential_refresh_success, "success"),
                (snapshot.credential_refresh_failure, "failure"),
            ],
            "outcome",
        );

        // Images
        self.write_counter(
            &mut output,
            "images_saved_total",
            "Images accepted into the store",
            snapshot.images_saved,
        );
        self.write_counter(
            &mut output,
            "images_deleted_total",
            "Images removed by an explicit delete",
            snapshot.images_deleted,
        );
        self.write_counter(
            &mut output,
            "images_expired_total",
            "Images removed by TTL expiry",
            snapshot.images_expired,
        );
        self.write_gauge(
            &mut output,
            "images_live",
            "Images currently held in memory",
            snapshot.images_live,
        );
        self.write_counter(
            &mut output,
            "image_bytes_saved_total",
            "Bytes accepted into the store",
            snapshot.image_bytes_saved,
        );
        self.write_counter(
            &mut output,
            "image_bytes_freed_total",
            "Bytes released from the store",
            snapshot.image_bytes_freed,
        );
        self.write_gauge(
            &mut output,
            "image_bytes_live",
            "Bytes currently held in memory",
            snapshot.image_bytes_live,
        );

        // Callbacks
        self.write_counter_with_labels(
            &mut output,
            "delivery_callbacks_total",
            "Delivery callbacks by outcome",
            &[
                (snapshot.callbacks_sent, "success"),
                (snapshot.callbacks_failed, "failure"),
            ],
            "outcome",
        );

        // Chat proxy
        let mut classes: Vec<_> = snapshot.chat_requests.iter().collect();
        classes.sort();
        let samples: Vec<_> = classes
            .into_iter()
            .map(|(class, count)| (*count, class.as_str()))
            .collect();
        self.write_counter_with_labels(
            &mut output,
            "chat_requests_total",
            "Proxied chat requests by upstream status class",
            &samples,
            "status",
        );

        output
    }

    fn write_header(&self, output: &mut String, full_name: &str, help: &str, kind: &str) {
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} {}\n", full_name, kind));
    }

    fn write_gauge(&self, output: &mut String, name: &str, help: &str, value: u64) {
        let full_name = format!("{}_{}", self.namespace, name);
        self.write_header(output, &full_name, help, "gauge");
        output.push_str(&format!("{} {}\n", full_name, value));
    }

    fn write_counter(&self, output: &mut String, name: &str, help: &str, value: u64) {
        let full_name = format!("{}_{}", self.namespace, name);
        self.write_header(output, &full_name, help, "counter");
        output.push_str(&format!("{} {}\n", full_name, value));
    }

    /// One HELP/TYPE header followed by a sample per label value.
    fn write_counter_with_labels(
        &self,
        output: &mut String,
        name: &str,
        help: &str,
        samples: &[(u64, &str)],
        label: &str,
    ) {
        if samples.is_empty() {
            return;
        }
        let full_name = format!("{}_{}", self.namespace, name);
        self.write_header(output, &full_name, help, "counter");
        for (value, label_value) in samples {
            output.push_str(&format!(
                "{}{{{}=\"{}\"}} {}\n",
                full_name, label, label_value, value
            ));
        }
    }
}
