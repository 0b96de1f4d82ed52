use crate::domain::order::OrderView;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    order: String,
    client: &'a str,
    equipment: &'a str,
    service: &'static str,
    status: &'static str,
    priority: &'static str,
    approved: bool,
    prepaid: bool,
    charge: Option<&'a str>,
    amount: Option<String>,
    events: usize,
}

impl<'a> From<&'a OrderView> for OrderRow<'a> {
    fn from(view: &'a OrderView) -> Self {
        let order = &view.order;
        Self {
            order: order.order_id.to_string(),
            client: order.client_id.as_str(),
            equipment: &order.equipment_id,
            service: order.service_type.as_str(),
            status: order.status.as_str(),
            priority: order.priority.as_str(),
            approved: order.approved,
            prepaid: order.prepaid,
            charge: order.charge.as_ref().map(|c| c.charge_id.as_str()),
            amount: order.charge.as_ref().map(|c| c.amount.to_string()),
            events: view.events.len(),
        }
    }
}

/// Writes the final order report as CSV.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, views: &[OrderView]) -> Result<(), csv::Error> {
        if views.is_empty() {
            self.writer.write_record([
                "order", "client", "equipment", "service", "status", "priority", "approved",
                "prepaid", "charge", "amount", "events",
            ])?;
        }
        for view in views {
            self.writer.serialize(OrderRow::from(view))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
