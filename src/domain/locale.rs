//! Caller locale for user-facing messages.
//!
//! The locale travels with every operation inside [`super::OpContext`]; nothing
//! reads it from ambient state.

use serde::{Deserialize, Serialize};

use super::errors::IssueCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    /// Parse a language tag such as `fr`, `fr-FR` or an `Accept-Language` value.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(',')
            .next()
            .unwrap_or("")
            .split(['-', '_', ';'])
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match primary.as_str() {
            "fr" => Locale::Fr,
            _ => Locale::En,
        }
    }

    pub fn message(self, code: IssueCode) -> &'static str {
        match self {
            Locale::En => english(code),
            Locale::Fr => french(code),
        }
    }
}

fn english(code: IssueCode) -> &'static str {
    use IssueCode::*;
    match code {
        CardInactive => "The library card is not active",
        CardHasUnpaidFines => "The library card has unpaid fines",
        EmptyRequest => "The request contains no lines",
        DuplicateItem => "The item appears more than once",
        DuplicateResource => "The digital resource appears more than once",
        ItemNotFound => "The item does not exist",
        ResourceNotFound => "The digital resource does not exist",
        AlreadyRequested => "The item is already requested on this card",
        AlreadyBorrowed => "The item is already borrowed on this card",
        AlreadyReserved => "The item is already reserved on this card",
        ResourceAlreadyActive => "The digital resource is already requested or borrowed",
        BorrowLimitExceeded => "The card has reached its borrowing limit",
        RequestNotMutable => "The request can no longer be changed",
        ReservationClosed => "The reservation is already closed",
        TooFewInstances => "Fewer copies were supplied than the request has lines",
        TooManyInstances => "More copies were supplied than the request has lines",
        DuplicateInstance => "The copy appears more than once",
        SameItemTwice => "Two copies of the same item were supplied",
        InstanceNotFound => "The copy does not exist",
        InstanceUnavailable => "The copy is not on the shelf",
        InstanceAlreadyBorrowed => "The copy is already on loan",
        InstanceReservedForOther => "The copy is held for another patron",
        InstanceRequestedByOther => "The copy is needed for another patron's request",
        WrongInstanceForReservation => "The copy is not the one held for this reservation",
        MissingConditionHistory => "The copy has no recorded condition",
        ItemNotInRequest => "The copy belongs to an item that is not in the request",
        SelfServiceInLibrary => "Self-service checkout is limited to take-home loans",
        DuplicateDetail => "The loan line appears more than once",
        DetailNotFound => "The loan line does not belong to this record",
        DetailNotBorrowing => "Only loan lines currently borrowed can be extended",
        DetailClosed => "The loan line is already closed",
        ExtensionLimitReached => "The maximum number of extensions has been reached",
        ExtensionTooEarly => "It is too early to extend this loan",
        ExtensionBlockedByReservation => "Another patron is waiting for this item",
        NoDueDate => "In-library loans have no due date to extend",
        DetailInBothLists => "The loan line is listed as both returned and lost",
        UnexpectedFine => "A loan returned on time cannot carry a fine",
        OverdueFineRequired => "An overdue return needs exactly one overdue fine",
        WrongFineType => "The fine policy does not match the loan outcome",
        ReturnConditionRequired => "The return condition must be registered",
        LostFineRequired => "A lost copy needs at least one lost-item fine",
        MissingEstimatedPrice => "The item has no estimated price to charge",
        FinePolicyNotFound => "The fine policy does not exist",
        CapacityExhausted => "No copy of the item is left to allocate",
        ConcurrentModification => "The record was changed by someone else, try again",
    }
}

fn french(code: IssueCode) -> &'static str {
    use IssueCode::*;
    match code {
        CardInactive => "La carte de lecteur n'est pas active",
        CardHasUnpaidFines => "La carte de lecteur a des amendes impayées",
        EmptyRequest => "La demande ne contient aucune ligne",
        DuplicateItem => "Le document apparaît plusieurs fois",
        DuplicateResource => "La ressource numérique apparaît plusieurs fois",
        ItemNotFound => "Le document n'existe pas",
        ResourceNotFound => "La ressource numérique n'existe pas",
        AlreadyRequested => "Le document est déjà demandé sur cette carte",
        AlreadyBorrowed => "Le document est déjà emprunté sur cette carte",
        AlreadyReserved => "Le document est déjà réservé sur cette carte",
        ResourceAlreadyActive => "La ressource numérique est déjà demandée ou empruntée",
        BorrowLimitExceeded => "La carte a atteint sa limite d'emprunts",
        RequestNotMutable => "La demande ne peut plus être modifiée",
        ReservationClosed => "La réservation est déjà close",
        TooFewInstances => "Moins d'exemplaires que de lignes dans la demande",
        TooManyInstances => "Plus d'exemplaires que de lignes dans la demande",
        DuplicateInstance => "L'exemplaire apparaît plusieurs fois",
        SameItemTwice => "Deux exemplaires du même document ont été fournis",
        InstanceNotFound => "L'exemplaire n'existe pas",
        InstanceUnavailable => "L'exemplaire n'est pas en rayon",
        InstanceAlreadyBorrowed => "L'exemplaire est déjà prêté",
        InstanceReservedForOther => "L'exemplaire est mis de côté pour un autre lecteur",
        InstanceRequestedByOther => "L'exemplaire est nécessaire à la demande d'un autre lecteur",
        WrongInstanceForReservation => "Ce n'est pas l'exemplaire mis de côté pour cette réservation",
        MissingConditionHistory => "L'exemplaire n'a aucun état enregistré",
        ItemNotInRequest => "L'exemplaire appartient à un document absent de la demande",
        SelfServiceInLibrary => "Le prêt en libre-service est réservé aux emprunts à domicile",
        DuplicateDetail => "La ligne de prêt apparaît plusieurs fois",
        DetailNotFound => "La ligne de prêt n'appartient pas à ce prêt",
        DetailNotBorrowing => "Seules les lignes en cours d'emprunt peuvent être prolongées",
        DetailClosed => "La ligne de prêt est déjà close",
        ExtensionLimitReached => "Le nombre maximal de prolongations est atteint",
        ExtensionTooEarly => "Il est trop tôt pour prolonger ce prêt",
        ExtensionBlockedByReservation => "Un autre lecteur attend ce document",
        NoDueDate => "Les prêts sur place n'ont pas de date de retour à prolonger",
        DetailInBothLists => "La ligne de prêt est à la fois rendue et perdue",
        UnexpectedFine => "Un retour dans les délais ne peut pas porter d'amende",
        OverdueFineRequired => "Un retour en retard exige exactement une amende de retard",
        WrongFineType => "La politique d'amende ne correspond pas à l'issue du prêt",
        ReturnConditionRequired => "L'état au retour doit être enregistré",
        LostFineRequired => "Un exemplaire perdu exige au moins une amende de perte",
        MissingEstimatedPrice => "Le document n'a pas de prix estimé à facturer",
        FinePolicyNotFound => "La politique d'amende n'existe pas",
        CapacityExhausted => "Plus aucun exemplaire du document n'est disponible",
        ConcurrentModification => "L'enregistrement a été modifié entre-temps, réessayez",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accept_language_values() {
        assert_eq!(Locale::from_tag("fr-FR,fr;q=0.9,en;q=0.8"), Locale::Fr);
        assert_eq!(Locale::from_tag("en-GB"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }

    #[test]
    fn messages_differ_per_locale() {
        let code = IssueCode::BorrowLimitExceeded;
        assert_ne!(Locale::En.message(code), Locale::Fr.message(code));
    }
}
