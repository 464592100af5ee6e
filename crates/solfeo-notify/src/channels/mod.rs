//! Built-in transports.
//!
//! | type             | channel  | provider                                  |
//! |------------------|----------|-------------------------------------------|
//! | `smtp`           | email    | any SMTP relay                            |
//! | `whatsapp_web`   | whatsapp | HTTP bridge to a WhatsApp Web session     |
//! | `whatsapp_cloud` | whatsapp | WhatsApp Business Cloud API               |

pub mod email;
pub mod whatsapp_cloud;
pub mod whatsapp_web;
